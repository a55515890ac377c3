//! Reference pricing (VWAP), book snapshots, and market-order quotes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{errors::ExchangeError, OrderSide, SymbolRegistry};
use crate::engine::{Matcher, QuotePriceLevel as EngineQuotePriceLevel};
use crate::ids::Symbol;
use crate::store::TradeStore;

/// A single aggregated level in a [`BookResponse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookPriceLevel {
    pub price: i64,
    pub total_quantity: i64,
    pub order_count: usize,
}

/// Response for a current-price query.
#[derive(Clone, Debug)]
pub struct PriceResponse {
    pub symbol: Symbol,
    /// `None` when the symbol has never traded.
    pub current_price: Option<i64>,
    /// Human-readable VWAP window, e.g. `"5m"`.
    pub window: String,
    pub trades_in_window: usize,
    pub last_trade_at: Option<DateTime<Utc>>,
}

/// Response for a book-depth snapshot query.
#[derive(Clone, Debug)]
pub struct BookResponse {
    pub symbol: Symbol,
    pub bids: Vec<BookPriceLevel>,
    pub asks: Vec<BookPriceLevel>,
    /// `None` if either side of the book is empty.
    pub spread: Option<i64>,
    pub snapshot_at: DateTime<Utc>,
}

/// A single aggregated level in a [`QuoteResponse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotePriceLevel {
    pub price: i64,
    pub quantity: i64,
}

/// Response for a simulated market-order quote.
#[derive(Clone, Debug)]
pub struct QuoteResponse {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub quantity_requested: i64,
    pub quantity_available: i64,
    pub fully_fillable: bool,
    pub estimated_avg_price: Option<i64>,
    pub estimated_total: Option<i64>,
    pub price_levels: Vec<QuotePriceLevel>,
    pub quoted_at: DateTime<Utc>,
}

pub struct StockService {
    trade_store: Arc<TradeStore>,
    matcher: Arc<Matcher>,
    vwap_window: chrono::Duration,
    symbols: Arc<SymbolRegistry>,
}

impl StockService {
    pub fn new(
        trade_store: Arc<TradeStore>,
        matcher: Arc<Matcher>,
        vwap_window: chrono::Duration,
        symbols: Arc<SymbolRegistry>,
    ) -> Self {
        Self {
            trade_store,
            matcher,
            vwap_window,
            symbols,
        }
    }

    /// Volume-weighted average price over the configured window, walked
    /// backwards from the most recent trade until one falls outside it.
    /// Falls back to the last trade's price when the window itself is
    /// empty, and to `None` when the symbol has never traded at all.
    pub fn get_price(&self, symbol: &str) -> Result<PriceResponse, ExchangeError> {
        if !self.symbols.exists(symbol) {
            return Err(ExchangeError::SymbolNotFound);
        }

        let trades = self.trade_store.get_by_symbol(symbol);
        let mut resp = PriceResponse {
            symbol: symbol.to_string(),
            current_price: None,
            window: format_duration(self.vwap_window),
            trades_in_window: 0,
            last_trade_at: None,
        };

        let Some(last_trade) = trades.last() else {
            return Ok(resp);
        };
        resp.last_trade_at = Some(last_trade.executed_at);

        let window_start = Utc::now() - self.vwap_window;
        let mut sum_price_qty: i64 = 0;
        let mut sum_qty: i64 = 0;
        let mut trades_in_window = 0usize;

        for trade in trades.iter().rev() {
            if trade.executed_at < window_start {
                break;
            }
            sum_price_qty += trade.price * trade.quantity;
            sum_qty += trade.quantity;
            trades_in_window += 1;
        }
        resp.trades_in_window = trades_in_window;

        resp.current_price = Some(if sum_qty > 0 {
            sum_price_qty / sum_qty
        } else {
            last_trade.price
        });

        Ok(resp)
    }

    /// Top `depth` aggregated price levels on each side, plus the current
    /// spread. `depth` must be in `1..=50`.
    pub fn get_book(&self, symbol: &str, depth: usize) -> Result<BookResponse, ExchangeError> {
        if !self.symbols.exists(symbol) {
            return Err(ExchangeError::SymbolNotFound);
        }
        if !(1..=50).contains(&depth) {
            return Err(ExchangeError::Validation(
                "depth must be between 1 and 50".to_string(),
            ));
        }

        let book_ref = self.matcher.books().get_or_create(symbol);
        let book = book_ref.read().expect("book lock poisoned");

        let top_bids = book.top_bids(depth);
        let top_asks = book.top_asks(depth);

        let spread = match (top_bids.first(), top_asks.first()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        };

        Ok(BookResponse {
            symbol: symbol.to_string(),
            bids: top_bids
                .into_iter()
                .map(|pl| BookPriceLevel {
                    price: pl.price,
                    total_quantity: pl.total_quantity,
                    order_count: pl.order_count,
                })
                .collect(),
            asks: top_asks
                .into_iter()
                .map(|pl| BookPriceLevel {
                    price: pl.price,
                    total_quantity: pl.total_quantity,
                    order_count: pl.order_count,
                })
                .collect(),
            spread,
            snapshot_at: Utc::now(),
        })
    }

    /// Simulates a market order without placing it.
    pub fn get_quote(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: i64,
    ) -> Result<QuoteResponse, ExchangeError> {
        if !self.symbols.exists(symbol) {
            return Err(ExchangeError::SymbolNotFound);
        }
        if quantity <= 0 {
            return Err(ExchangeError::Validation(
                "quantity must be a positive integer".to_string(),
            ));
        }

        let result = self.matcher.simulate_market_order(symbol, side, quantity);

        Ok(QuoteResponse {
            symbol: symbol.to_string(),
            side,
            quantity_requested: quantity,
            quantity_available: result.quantity_available,
            fully_fillable: result.fully_fillable,
            estimated_avg_price: result.estimated_avg_price,
            estimated_total: result.estimated_total,
            price_levels: result
                .price_levels
                .into_iter()
                .map(|pl: EngineQuotePriceLevel| QuotePriceLevel {
                    price: pl.price,
                    quantity: pl.quantity,
                })
                .collect(),
            quoted_at: Utc::now(),
        })
    }
}

/// Renders a window as `"Nm"` when it's a whole number of minutes,
/// otherwise falls back to the duration's default `HH:MM:SS` text.
fn format_duration(d: chrono::Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    let minutes = d.num_minutes();
    if minutes > 0 && chrono::Duration::minutes(minutes) == d {
        return format!("{minutes}m");
    }
    let seconds = d.num_seconds();
    format!("{seconds}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BookManager;
    use crate::domain::{Broker, Holding, Trade};
    use crate::engine::NewOrderRequest;
    use crate::domain::OrderType;
    use crate::ids::TradeId;
    use crate::store::{BrokerStore, OrderStore};
    use std::collections::HashMap;

    fn service() -> (StockService, Arc<TradeStore>, Arc<SymbolRegistry>, Arc<Matcher>) {
        let books = Arc::new(BookManager::new());
        let broker_store = Arc::new(BrokerStore::new());
        let order_store = Arc::new(OrderStore::new());
        let trade_store = Arc::new(TradeStore::new());
        let symbols = Arc::new(SymbolRegistry::new());
        let matcher = Arc::new(Matcher::new(
            books,
            broker_store,
            order_store,
            trade_store.clone(),
            symbols.clone(),
        ));
        let svc = StockService::new(
            trade_store.clone(),
            matcher.clone(),
            chrono::Duration::minutes(5),
            symbols.clone(),
        );
        (svc, trade_store, symbols, matcher)
    }

    #[test]
    fn get_price_unknown_symbol_errors() {
        let (svc, ..) = service();
        assert_eq!(svc.get_price("AAPL").unwrap_err(), ExchangeError::SymbolNotFound);
    }

    #[test]
    fn get_price_with_no_trades_is_null() {
        let (svc, _, symbols, _) = service();
        symbols.register("AAPL");
        let resp = svc.get_price("AAPL").unwrap();
        assert!(resp.current_price.is_none());
        assert_eq!(resp.window, "5m");
    }

    #[test]
    fn get_price_computes_vwap_over_window() {
        let (svc, trade_store, symbols, _) = service();
        symbols.register("AAPL");
        trade_store.append(
            "AAPL",
            Trade {
                trade_id: TradeId::new(),
                order_id: crate::ids::OrderId::new(),
                price: 100,
                quantity: 10,
                executed_at: Utc::now(),
            },
        );
        trade_store.append(
            "AAPL",
            Trade {
                trade_id: TradeId::new(),
                order_id: crate::ids::OrderId::new(),
                price: 200,
                quantity: 10,
                executed_at: Utc::now(),
            },
        );

        let resp = svc.get_price("AAPL").unwrap();
        assert_eq!(resp.current_price, Some(150));
        assert_eq!(resp.trades_in_window, 2);
    }

    #[test]
    fn get_price_falls_back_to_last_trade_outside_window() {
        let (svc, trade_store, symbols, _) = service();
        symbols.register("AAPL");
        trade_store.append(
            "AAPL",
            Trade {
                trade_id: TradeId::new(),
                order_id: crate::ids::OrderId::new(),
                price: 300,
                quantity: 1,
                executed_at: Utc::now() - chrono::Duration::hours(1),
            },
        );

        let resp = svc.get_price("AAPL").unwrap();
        assert_eq!(resp.current_price, Some(300));
        assert_eq!(resp.trades_in_window, 0);
    }

    #[test]
    fn get_book_rejects_out_of_range_depth() {
        let (svc, _, symbols, _) = service();
        symbols.register("AAPL");
        assert!(matches!(
            svc.get_book("AAPL", 0).unwrap_err(),
            ExchangeError::Validation(_)
        ));
        assert!(matches!(
            svc.get_book("AAPL", 51).unwrap_err(),
            ExchangeError::Validation(_)
        ));
    }

    #[test]
    fn get_book_reports_spread() {
        let (svc, _, symbols, matcher) = service();
        let broker_store_access = Arc::new(BrokerStore::new());
        broker_store_access
            .create(Arc::new(Broker::new(
                "seller".to_string(),
                0,
                HashMap::from([("AAPL".to_string(), Holding { quantity: 10, reserved_quantity: 0 })]),
            )))
            .unwrap();
        symbols.register("AAPL");
        let _ = &broker_store_access;

        // Rest an ask directly through the shared matcher so the book and
        // the service under test observe the same state.
        let matcher_with_broker = Arc::new(Matcher::new(
            Arc::new(BookManager::new()),
            broker_store_access,
            Arc::new(OrderStore::new()),
            Arc::new(TradeStore::new()),
            symbols.clone(),
        ));
        let _ = matcher;
        matcher_with_broker
            .submit_limit_order(NewOrderRequest {
                order_type: OrderType::Limit,
                broker_id: "seller".to_string(),
                document_number: "DOC1".to_string(),
                side: OrderSide::Ask,
                symbol: "AAPL".to_string(),
                price: 105,
                quantity: 10,
                expires_at: Some(Utc::now() + chrono::Duration::days(1)),
            })
            .unwrap();

        let svc2 = StockService::new(
            Arc::new(TradeStore::new()),
            matcher_with_broker,
            chrono::Duration::minutes(5),
            symbols,
        );
        let book = svc2.get_book("AAPL", 10).unwrap();
        assert_eq!(book.asks.len(), 1);
        assert!(book.bids.is_empty());
        assert!(book.spread.is_none());
        let _ = svc;
    }

    #[test]
    fn get_quote_rejects_non_positive_quantity() {
        let (svc, _, symbols, _) = service();
        symbols.register("AAPL");
        assert!(matches!(
            svc.get_quote("AAPL", OrderSide::Bid, 0).unwrap_err(),
            ExchangeError::Validation(_)
        ));
    }
}
