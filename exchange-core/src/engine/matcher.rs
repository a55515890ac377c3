//! The matching engine: validates and reserves balances, runs the fill loop
//! against the opposite side of a symbol's book, settles cash and holdings,
//! and either rests the remainder (limit orders) or cancels it
//! immediate-or-cancel (market orders).

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::book::{BookEntry, BookManager, OrderBook};
use crate::domain::{
    Broker, ExchangeError, Holding, Order, OrderSide, OrderStatus, OrderType, SharedOrder,
    SymbolRegistry, Trade,
};
use crate::ids::{BrokerId, DocumentNumber, OrderId, Symbol, TradeId};
use crate::store::{BrokerStore, OrderStore, TradeStore};

/// A fully-validated instruction to submit a new order. Assembled by the
/// service layer after request validation; the matcher assigns identity and
/// drives the rest of the lifecycle.
#[derive(Clone, Debug)]
pub struct NewOrderRequest {
    pub order_type: OrderType,
    pub broker_id: BrokerId,
    pub document_number: DocumentNumber,
    pub side: OrderSide,
    pub symbol: Symbol,
    /// Minor units. Ignored for market orders.
    pub price: i64,
    pub quantity: i64,
    /// Limit orders only.
    pub expires_at: Option<DateTime<Utc>>,
}

/// One aggregated price level touched by a simulated market order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotePriceLevel {
    pub price: i64,
    pub quantity: i64,
}

/// The outcome of walking the opposite side of the book for a hypothetical
/// market order, without mutating any state.
#[derive(Clone, Debug, Default)]
pub struct QuoteResult {
    pub quantity_available: i64,
    pub fully_fillable: bool,
    /// `None` when no liquidity at all is available.
    pub estimated_avg_price: Option<i64>,
    pub estimated_total: Option<i64>,
    pub price_levels: Vec<QuotePriceLevel>,
}

pub struct Matcher {
    books: Arc<BookManager>,
    broker_store: Arc<BrokerStore>,
    order_store: Arc<OrderStore>,
    trade_store: Arc<TradeStore>,
    symbols: Arc<SymbolRegistry>,
}

impl Matcher {
    pub fn new(
        books: Arc<BookManager>,
        broker_store: Arc<BrokerStore>,
        order_store: Arc<OrderStore>,
        trade_store: Arc<TradeStore>,
        symbols: Arc<SymbolRegistry>,
    ) -> Self {
        Self {
            books,
            broker_store,
            order_store,
            trade_store,
            symbols,
        }
    }

    /// Gives read-only callers (book snapshots, quote simulation) access to
    /// the same book manager the matcher mutates against.
    pub fn books(&self) -> &Arc<BookManager> {
        &self.books
    }

    /// Runs a freshly validated limit order through the matching engine.
    /// Holds the symbol's book write lock for the entire pass.
    pub fn submit_limit_order(
        &self,
        req: NewOrderRequest,
    ) -> Result<(SharedOrder, Vec<Trade>), ExchangeError> {
        let book_ref = self.books.get_or_create(&req.symbol);
        let mut book = book_ref.write().expect("book lock poisoned");

        let broker = self.broker_store.get(&req.broker_id)?;
        reserve_for_new_order(&broker, req.side, &req.symbol, req.price, req.quantity)?;

        self.symbols.register(&req.symbol);

        let shared_order = new_order_handle(&req);
        self.order_store.create(shared_order.clone());

        let trades = self.run_fill_loop(
            &mut book,
            &shared_order,
            req.order_type,
            req.side,
            &req.symbol,
            true,
        )?;

        let remaining = shared_order.lock().expect("order lock poisoned").remaining_quantity;
        if remaining > 0 {
            let entry = {
                let guard = shared_order.lock().expect("order lock poisoned");
                BookEntry {
                    price: guard.price,
                    created_at: guard.created_at,
                    order_id: guard.order_id,
                    order: shared_order.clone(),
                }
            };
            match req.side {
                OrderSide::Bid => book.insert_bid(entry),
                OrderSide::Ask => book.insert_ask(entry),
            }
        }

        Ok((shared_order, trades))
    }

    /// Runs a freshly validated market order through the matching engine
    /// using immediate-or-cancel semantics: fills what's available, cancels
    /// the rest, never rests on the book.
    pub fn submit_market_order(
        &self,
        req: NewOrderRequest,
    ) -> Result<(SharedOrder, Vec<Trade>), ExchangeError> {
        let book_ref = self.books.get_or_create(&req.symbol);
        let mut book = book_ref.write().expect("book lock poisoned");

        let opposite_present = match req.side {
            OrderSide::Bid => book.best_ask().is_some(),
            OrderSide::Ask => book.best_bid().is_some(),
        };
        if !opposite_present {
            return Err(ExchangeError::NoLiquidity);
        }

        let broker = self.broker_store.get(&req.broker_id)?;
        match req.side {
            OrderSide::Bid => {
                let estimated_cost = estimate_market_bid_cost(&book, req.quantity);
                let state = broker.lock();
                if state.available_cash() < estimated_cost {
                    return Err(ExchangeError::InsufficientBalance);
                }
                // Market bids never reserve cash — they execute immediately.
            }
            OrderSide::Ask => {
                let mut state = broker.lock();
                if state.available_quantity(&req.symbol) < req.quantity {
                    return Err(ExchangeError::InsufficientHoldings);
                }
                state.holdings.entry(req.symbol.clone()).or_default().reserved_quantity +=
                    req.quantity;
            }
        }

        self.symbols.register(&req.symbol);

        let shared_order = new_order_handle(&req);
        self.order_store.create(shared_order.clone());

        let trades = self.run_fill_loop(
            &mut book,
            &shared_order,
            req.order_type,
            req.side,
            &req.symbol,
            false,
        )?;

        {
            let mut guard = shared_order.lock().expect("order lock poisoned");
            if guard.remaining_quantity > 0 {
                guard.cancelled_quantity = guard.remaining_quantity;
                guard.remaining_quantity = 0;
                guard.status = if guard.filled_quantity == guard.quantity {
                    OrderStatus::Filled
                } else {
                    OrderStatus::Cancelled
                };
            }
        }

        let cancelled_quantity = shared_order.lock().expect("order lock poisoned").cancelled_quantity;
        if req.side == OrderSide::Ask && cancelled_quantity > 0 {
            let mut state = broker.lock();
            if let Some(holding) = state.holdings.get_mut(&req.symbol) {
                holding.reserved_quantity -= cancelled_quantity;
            }
        }

        Ok((shared_order, trades))
    }

    /// Cancels a pending or partially filled order, releasing its
    /// reservation and removing it from the book if resting.
    pub fn cancel_order(&self, order_id: OrderId) -> Result<SharedOrder, ExchangeError> {
        let shared_order = self.order_store.get(order_id)?;

        let symbol = {
            let guard = shared_order.lock().expect("order lock poisoned");
            if !guard.status.is_active() {
                return Err(ExchangeError::OrderNotCancellable);
            }
            guard.symbol.clone()
        };

        let book_ref = self.books.get_or_create(&symbol);
        let mut book = book_ref.write().expect("book lock poisoned");

        // Re-check under lock: another pass may have filled/cancelled it
        // between the check above and acquiring the book lock.
        let (broker_id, side, price, remaining) = {
            let guard = shared_order.lock().expect("order lock poisoned");
            if !guard.status.is_active() {
                return Err(ExchangeError::OrderNotCancellable);
            }
            (
                guard.broker_id.clone(),
                guard.side,
                guard.price,
                guard.remaining_quantity,
            )
        };

        book.remove(order_id);

        {
            let mut guard = shared_order.lock().expect("order lock poisoned");
            guard.cancelled_quantity = guard.remaining_quantity;
            guard.remaining_quantity = 0;
            guard.status = OrderStatus::Cancelled;
            guard.cancelled_at = Some(Utc::now());
        }

        match self.broker_store.get(&broker_id) {
            Ok(broker) => {
                let mut state = broker.lock();
                match side {
                    OrderSide::Bid => state.reserved_cash -= price * remaining,
                    OrderSide::Ask => {
                        if let Some(holding) = state.holdings.get_mut(&symbol) {
                            holding.reserved_quantity -= remaining;
                        }
                    }
                }
            }
            Err(_) => {
                tracing::warn!(%broker_id, "broker absent at cancel time, skipping reservation release");
            }
        }

        Ok(shared_order)
    }

    /// Read-only walk of the opposite side of the book to estimate the
    /// outcome of a market order without placing it.
    pub fn simulate_market_order(&self, symbol: &str, side: OrderSide, quantity: i64) -> QuoteResult {
        let book_ref = self.books.get_or_create(symbol);
        let book = book_ref.read().expect("book lock poisoned");

        let mut result = QuoteResult::default();
        let mut remaining = quantity;
        let mut total_cost: i64 = 0;

        let visit = |entry: &BookEntry| -> bool {
            if remaining <= 0 {
                return false;
            }
            let order_remaining = entry.order.lock().expect("order lock poisoned").remaining_quantity;
            let fill_qty = order_remaining.min(remaining);
            total_cost += entry.price * fill_qty;
            result.quantity_available += fill_qty;
            remaining -= fill_qty;

            if let Some(last) = result.price_levels.last_mut() {
                if last.price == entry.price {
                    last.quantity += fill_qty;
                    return true;
                }
            }
            result.price_levels.push(QuotePriceLevel {
                price: entry.price,
                quantity: fill_qty,
            });
            true
        };

        match side {
            OrderSide::Bid => book.walk_asks(visit),
            OrderSide::Ask => book.walk_bids(visit),
        }

        if result.quantity_available > 0 {
            result.estimated_avg_price = Some(total_cost / result.quantity_available);
            result.estimated_total = Some(total_cost);
        }
        result.fully_fillable = result.quantity_available >= quantity;

        result
    }

    /// Drives the match loop for `shared_order` against the opposite side of
    /// `book`, settling every fill as it happens. Returns the incoming
    /// order's trade legs. `check_price` gates the price-compatibility test
    /// that only applies to limit orders — market orders accept any price.
    fn run_fill_loop(
        &self,
        book: &mut OrderBook,
        shared_order: &SharedOrder,
        order_type: OrderType,
        side: OrderSide,
        symbol: &str,
        check_price: bool,
    ) -> Result<Vec<Trade>, ExchangeError> {
        let mut trades = Vec::new();
        let incoming_broker_id = shared_order.lock().expect("order lock poisoned").broker_id.clone();

        loop {
            let remaining = shared_order.lock().expect("order lock poisoned").remaining_quantity;
            if remaining <= 0 {
                break;
            }

            let best_entry = match side {
                OrderSide::Bid => book.best_ask(),
                OrderSide::Ask => book.best_bid(),
            };
            let best_entry = match best_entry {
                Some(entry) => entry,
                None => break,
            };

            let order_price = shared_order.lock().expect("order lock poisoned").price;
            if check_price {
                let crosses = match side {
                    OrderSide::Bid => order_price >= best_entry.price,
                    OrderSide::Ask => best_entry.price <= order_price,
                };
                if !crosses {
                    break;
                }
            }

            let resting = best_entry.order.clone();
            let (fill_qty, resting_order_id, resting_broker_id, resting_price) = {
                let order_remaining = shared_order.lock().expect("order lock poisoned").remaining_quantity;
                let resting_guard = resting.lock().expect("order lock poisoned");
                (
                    order_remaining.min(resting_guard.remaining_quantity),
                    resting_guard.order_id,
                    resting_guard.broker_id.clone(),
                    resting_guard.price,
                )
            };

            // Ask-price execution rule: the ask always sets the price. For a
            // market order there is no incoming price to honour, so every
            // fill executes at the resting order's price regardless of side.
            let execution_price = match (order_type, side) {
                (OrderType::Market, _) => resting_price,
                (OrderType::Limit, OrderSide::Bid) => resting_price,
                (OrderType::Limit, OrderSide::Ask) => order_price,
            };
            let trade_id = TradeId::new();
            let executed_at = Utc::now();

            let incoming_trade = {
                let mut guard = shared_order.lock().expect("order lock poisoned");
                guard.remaining_quantity -= fill_qty;
                guard.filled_quantity += fill_qty;
                guard.status = if guard.remaining_quantity == 0 {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartiallyFilled
                };
                let trade = Trade {
                    trade_id,
                    order_id: guard.order_id,
                    price: execution_price,
                    quantity: fill_qty,
                    executed_at,
                };
                guard.trades.push(trade);
                trade
            };

            let resting_done;
            let resting_trade = {
                let mut guard = resting.lock().expect("order lock poisoned");
                guard.remaining_quantity -= fill_qty;
                guard.filled_quantity += fill_qty;
                guard.status = if guard.remaining_quantity == 0 {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartiallyFilled
                };
                resting_done = guard.remaining_quantity == 0;
                let trade = Trade {
                    trade_id,
                    order_id: guard.order_id,
                    price: execution_price,
                    quantity: fill_qty,
                    executed_at,
                };
                guard.trades.push(trade);
                trade
            };

            // The resting order is always a limit order, so a bid-side
            // reservation release always applies to it; for the incoming
            // side it only applies when the incoming order is itself a
            // limit order (a market bid never reserved cash up front).
            let cash_release = match side {
                OrderSide::Bid => {
                    if order_type == OrderType::Market {
                        0
                    } else {
                        order_price * fill_qty
                    }
                }
                OrderSide::Ask => resting_price * fill_qty,
            };
            let (buyer_broker_id, seller_broker_id) = match side {
                OrderSide::Bid => (incoming_broker_id.clone(), resting_broker_id.clone()),
                OrderSide::Ask => (resting_broker_id.clone(), incoming_broker_id.clone()),
            };

            settle_buyer(
                &self.broker_store,
                &buyer_broker_id,
                symbol,
                execution_price,
                fill_qty,
                cash_release,
            )?;
            settle_seller(&self.broker_store, &seller_broker_id, symbol, execution_price, fill_qty)?;

            trades.push(incoming_trade);
            self.trade_store.append(symbol, incoming_trade);
            self.trade_store.append(symbol, resting_trade);

            if resting_done {
                book.remove(resting_order_id);
            }
        }

        Ok(trades)
    }
}

fn new_order_handle(req: &NewOrderRequest) -> SharedOrder {
    let now = Utc::now();
    Arc::new(std::sync::Mutex::new(Order {
        order_id: OrderId::new(),
        order_type: req.order_type,
        broker_id: req.broker_id.clone(),
        document_number: req.document_number.clone(),
        side: req.side,
        symbol: req.symbol.clone(),
        price: req.price,
        quantity: req.quantity,
        filled_quantity: 0,
        remaining_quantity: req.quantity,
        cancelled_quantity: 0,
        status: OrderStatus::Pending,
        expires_at: req.expires_at,
        created_at: now,
        cancelled_at: None,
        expired_at: None,
        trades: Vec::new(),
    }))
}

fn reserve_for_new_order(
    broker: &Broker,
    side: OrderSide,
    symbol: &str,
    price: i64,
    quantity: i64,
) -> Result<(), ExchangeError> {
    let mut state = broker.lock();
    match side {
        OrderSide::Bid => {
            let required = price * quantity;
            if state.available_cash() < required {
                return Err(ExchangeError::InsufficientBalance);
            }
            state.reserved_cash += required;
        }
        OrderSide::Ask => {
            if state.available_quantity(symbol) < quantity {
                return Err(ExchangeError::InsufficientHoldings);
            }
            state.holdings.entry(symbol.to_string()).or_default().reserved_quantity += quantity;
        }
    }
    Ok(())
}

fn estimate_market_bid_cost(book: &OrderBook, quantity: i64) -> i64 {
    let mut remaining = quantity;
    let mut cost = 0i64;
    book.walk_asks(|entry| {
        if remaining <= 0 {
            return false;
        }
        let available = entry.order.lock().expect("order lock poisoned").remaining_quantity;
        let fill_qty = available.min(remaining);
        cost += entry.price * fill_qty;
        remaining -= fill_qty;
        remaining > 0
    });
    cost
}

fn settle_buyer(
    broker_store: &BrokerStore,
    broker_id: &str,
    symbol: &str,
    execution_price: i64,
    fill_qty: i64,
    cash_release: i64,
) -> Result<(), ExchangeError> {
    let buyer = broker_store.get(broker_id)?;
    let mut state = buyer.lock();
    state.cash_balance -= execution_price * fill_qty;
    state.reserved_cash -= cash_release;
    state.holdings.entry(symbol.to_string()).or_default().quantity += fill_qty;
    Ok(())
}

fn settle_seller(
    broker_store: &BrokerStore,
    broker_id: &str,
    symbol: &str,
    execution_price: i64,
    fill_qty: i64,
) -> Result<(), ExchangeError> {
    let seller = broker_store.get(broker_id)?;
    let mut state = seller.lock();
    state.cash_balance += execution_price * fill_qty;
    let holding = state.holdings.entry(symbol.to_string()).or_default();
    holding.quantity -= fill_qty;
    holding.reserved_quantity -= fill_qty;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn matcher() -> (Matcher, Arc<BrokerStore>) {
        let books = Arc::new(BookManager::new());
        let broker_store = Arc::new(BrokerStore::new());
        let order_store = Arc::new(OrderStore::new());
        let trade_store = Arc::new(TradeStore::new());
        let symbols = Arc::new(SymbolRegistry::new());
        let matcher = Matcher::new(
            books,
            broker_store.clone(),
            order_store,
            trade_store,
            symbols,
        );
        (matcher, broker_store)
    }

    fn seed_broker(store: &BrokerStore, id: &str, cash: i64, holdings: HashMap<Symbol, Holding>) {
        store.create(Arc::new(Broker::new(id.to_string(), cash, holdings))).unwrap();
    }

    fn limit_req(broker_id: &str, side: OrderSide, price: i64, quantity: i64) -> NewOrderRequest {
        NewOrderRequest {
            order_type: OrderType::Limit,
            broker_id: broker_id.to_string(),
            document_number: "DOC1".to_string(),
            side,
            symbol: "AAPL".to_string(),
            price,
            quantity,
            expires_at: Some(Utc::now() + chrono::Duration::days(1)),
        }
    }

    #[test]
    fn non_crossing_limit_orders_rest() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "seller", 0, HashMap::from([("AAPL".to_string(), Holding { quantity: 10, reserved_quantity: 0 })]));
        seed_broker(&broker_store, "buyer", 100_000, HashMap::new());

        let (_, trades) = matcher.submit_limit_order(limit_req("seller", OrderSide::Ask, 105, 10)).unwrap();
        assert!(trades.is_empty());
        let (_, trades) = matcher.submit_limit_order(limit_req("buyer", OrderSide::Bid, 104, 10)).unwrap();
        assert!(trades.is_empty());
    }

    #[test]
    fn crossing_limit_order_fills_and_settles() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "seller", 0, HashMap::from([("AAPL".to_string(), Holding { quantity: 10, reserved_quantity: 0 })]));
        seed_broker(&broker_store, "buyer", 100_000, HashMap::new());

        matcher.submit_limit_order(limit_req("seller", OrderSide::Ask, 100, 10)).unwrap();
        let (order, trades) = matcher.submit_limit_order(limit_req("buyer", OrderSide::Bid, 100, 10)).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 100);
        assert_eq!(order.lock().unwrap().status, OrderStatus::Filled);

        let buyer = broker_store.get("buyer").unwrap();
        assert_eq!(buyer.lock().cash_balance, 100_000 - 1_000);
        assert_eq!(buyer.lock().holdings.get("AAPL").unwrap().quantity, 10);

        let seller = broker_store.get("seller").unwrap();
        assert_eq!(seller.lock().cash_balance, 1_000);
        assert_eq!(seller.lock().holdings.get("AAPL").unwrap().quantity, 0);
    }

    #[test]
    fn crossing_at_better_price_executes_at_resting_price() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "seller", 0, HashMap::from([("AAPL".to_string(), Holding { quantity: 5, reserved_quantity: 0 })]));
        seed_broker(&broker_store, "buyer", 1_000_000, HashMap::new());

        matcher.submit_limit_order(limit_req("seller", OrderSide::Ask, 100, 5)).unwrap();
        let (order, trades) = matcher.submit_limit_order(limit_req("buyer", OrderSide::Bid, 150, 5)).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 100);
        assert_eq!(order.lock().unwrap().status, OrderStatus::Filled);

        let buyer = broker_store.get("buyer").unwrap();
        assert_eq!(buyer.lock().cash_balance, 1_000_000 - 500);
        assert_eq!(buyer.lock().reserved_cash, 0);
    }

    #[test]
    fn resting_orders_fill_in_chronological_order_at_same_price() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "seller1", 0, HashMap::from([("AAPL".to_string(), Holding { quantity: 10, reserved_quantity: 0 })]));
        seed_broker(&broker_store, "seller2", 0, HashMap::from([("AAPL".to_string(), Holding { quantity: 10, reserved_quantity: 0 })]));
        seed_broker(&broker_store, "buyer", 1_000_000, HashMap::new());

        let (first, _) = matcher.submit_limit_order(limit_req("seller1", OrderSide::Ask, 150, 10)).unwrap();
        let (second, _) = matcher.submit_limit_order(limit_req("seller2", OrderSide::Ask, 150, 10)).unwrap();

        matcher.submit_limit_order(limit_req("buyer", OrderSide::Bid, 150, 5)).unwrap();

        let first_guard = first.lock().unwrap();
        assert_eq!(first_guard.filled_quantity, 5);
        assert_eq!(first_guard.remaining_quantity, 5);
        assert_eq!(first_guard.status, OrderStatus::PartiallyFilled);

        let second_guard = second.lock().unwrap();
        assert_eq!(second_guard.filled_quantity, 0);
        assert_eq!(second_guard.remaining_quantity, 10);
        assert_eq!(second_guard.status, OrderStatus::Pending);
    }

    #[test]
    fn insufficient_balance_rejected_before_mutation() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "buyer", 10, HashMap::new());
        let err = matcher.submit_limit_order(limit_req("buyer", OrderSide::Bid, 100, 10)).unwrap_err();
        assert_eq!(err, ExchangeError::InsufficientBalance);
    }

    #[test]
    fn market_order_with_no_liquidity_errors() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "buyer", 100_000, HashMap::new());
        let req = NewOrderRequest {
            order_type: OrderType::Market,
            broker_id: "buyer".to_string(),
            document_number: "DOC1".to_string(),
            side: OrderSide::Bid,
            symbol: "AAPL".to_string(),
            price: 0,
            quantity: 5,
            expires_at: None,
        };
        let err = matcher.submit_market_order(req).unwrap_err();
        assert_eq!(err, ExchangeError::NoLiquidity);
    }

    #[test]
    fn market_order_partial_fill_cancels_remainder() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "seller", 0, HashMap::from([("AAPL".to_string(), Holding { quantity: 5, reserved_quantity: 0 })]));
        seed_broker(&broker_store, "buyer", 100_000, HashMap::new());

        matcher.submit_limit_order(limit_req("seller", OrderSide::Ask, 100, 5)).unwrap();
        let req = NewOrderRequest {
            order_type: OrderType::Market,
            broker_id: "buyer".to_string(),
            document_number: "DOC1".to_string(),
            side: OrderSide::Bid,
            symbol: "AAPL".to_string(),
            price: 0,
            quantity: 10,
            expires_at: None,
        };
        let (order, trades) = matcher.submit_market_order(req).unwrap();
        assert_eq!(trades.len(), 1);
        let guard = order.lock().unwrap();
        assert_eq!(guard.filled_quantity, 5);
        assert_eq!(guard.cancelled_quantity, 5);
        assert_eq!(guard.status, OrderStatus::Cancelled);
    }

    #[test]
    fn market_ask_executes_at_resting_bid_price() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "seller", 0, HashMap::from([("AAPL".to_string(), Holding { quantity: 5, reserved_quantity: 0 })]));
        seed_broker(&broker_store, "buyer", 1_000_000, HashMap::new());

        matcher.submit_limit_order(limit_req("buyer", OrderSide::Bid, 150, 5)).unwrap();
        let req = NewOrderRequest {
            order_type: OrderType::Market,
            broker_id: "seller".to_string(),
            document_number: "DOC1".to_string(),
            side: OrderSide::Ask,
            symbol: "AAPL".to_string(),
            price: 0,
            quantity: 5,
            expires_at: None,
        };
        let (order, trades) = matcher.submit_market_order(req).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 150);
        assert_eq!(order.lock().unwrap().status, OrderStatus::Filled);

        let seller = broker_store.get("seller").unwrap();
        assert_eq!(seller.lock().cash_balance, 150 * 5);
    }

    #[test]
    fn cancel_releases_reservation_and_removes_from_book() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "buyer", 100_000, HashMap::new());
        let (order, _) = matcher.submit_limit_order(limit_req("buyer", OrderSide::Bid, 100, 10)).unwrap();
        let order_id = order.lock().unwrap().order_id;

        matcher.cancel_order(order_id).unwrap();
        assert_eq!(order.lock().unwrap().status, OrderStatus::Cancelled);
        let buyer = broker_store.get("buyer").unwrap();
        assert_eq!(buyer.lock().reserved_cash, 0);
    }

    #[test]
    fn cancel_already_filled_order_fails() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "seller", 0, HashMap::from([("AAPL".to_string(), Holding { quantity: 10, reserved_quantity: 0 })]));
        seed_broker(&broker_store, "buyer", 100_000, HashMap::new());
        matcher.submit_limit_order(limit_req("seller", OrderSide::Ask, 100, 10)).unwrap();
        let (order, _) = matcher.submit_limit_order(limit_req("buyer", OrderSide::Bid, 100, 10)).unwrap();
        let order_id = order.lock().unwrap().order_id;

        let err = matcher.cancel_order(order_id).unwrap_err();
        assert_eq!(err, ExchangeError::OrderNotCancellable);
    }

    #[test]
    fn simulate_market_order_reports_levels_without_mutating() {
        let (matcher, broker_store) = matcher();
        seed_broker(&broker_store, "seller", 0, HashMap::from([("AAPL".to_string(), Holding { quantity: 20, reserved_quantity: 0 })]));
        matcher.submit_limit_order(limit_req("seller", OrderSide::Ask, 100, 10)).unwrap();
        matcher.submit_limit_order(limit_req("seller", OrderSide::Ask, 105, 10)).unwrap();

        let quote = matcher.simulate_market_order("AAPL", OrderSide::Bid, 15);
        assert_eq!(quote.quantity_available, 15);
        assert!(quote.fully_fillable);
        assert_eq!(quote.price_levels.len(), 2);
        assert_eq!(quote.estimated_total, Some(100 * 10 + 105 * 5));

        // Read-only: book still has the original resting quantity.
        let book_ref = matcher.books.get_or_create("AAPL");
        assert_eq!(book_ref.read().unwrap().ask_count(), 2);
    }
}
