//! Order submission, lookup, cancellation, and listing, plus the trade
//! webhook fan-out that follows every fill.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::{errors::ExchangeError, OrderSide, OrderStatus, OrderType, SharedOrder, Trade};
use crate::engine::{ExpiryManager, Matcher, NewOrderRequest};
use crate::ids::{BrokerId, DocumentNumber, OrderId, Symbol};
use crate::money::decimal_to_minor;
use crate::service::webhook::{OrderEventSnapshot, WebhookService};
use crate::store::{BrokerStore, OrderStore, TradeStore};

static DOCUMENT_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{1,32}$").unwrap());
static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{1,10}$").unwrap());

/// Validated input for [`OrderService::submit_order`].
///
/// `price` and `expires_at` are required for `OrderType::Limit` and must be
/// absent for `OrderType::Market` — market orders always execute
/// immediate-or-cancel at whatever price the book offers.
#[derive(Clone, Debug)]
pub struct SubmitOrderRequest {
    pub order_type: OrderType,
    pub broker_id: BrokerId,
    pub document_number: DocumentNumber,
    pub side: OrderSide,
    pub symbol: Symbol,
    pub price: Option<Decimal>,
    pub quantity: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct OrderService {
    matcher: Arc<Matcher>,
    expiry: Arc<ExpiryManager>,
    webhook_svc: Arc<WebhookService>,
    order_store: Arc<OrderStore>,
    broker_store: Arc<BrokerStore>,
    trade_store: Arc<TradeStore>,
}

impl OrderService {
    pub fn new(
        matcher: Arc<Matcher>,
        expiry: Arc<ExpiryManager>,
        webhook_svc: Arc<WebhookService>,
        order_store: Arc<OrderStore>,
        broker_store: Arc<BrokerStore>,
        trade_store: Arc<TradeStore>,
    ) -> Self {
        Self {
            matcher,
            expiry,
            webhook_svc,
            order_store,
            broker_store,
            trade_store,
        }
    }

    pub async fn submit_order(&self, req: SubmitOrderRequest) -> Result<SharedOrder, ExchangeError> {
        if !DOCUMENT_NUMBER_RE.is_match(&req.document_number) {
            return Err(ExchangeError::Validation(
                "document_number must match ^[A-Za-z0-9]{1,32}$".to_string(),
            ));
        }
        if !SYMBOL_RE.is_match(&req.symbol) {
            return Err(ExchangeError::Validation(
                "symbol must match ^[A-Z]{1,10}$".to_string(),
            ));
        }
        if req.quantity <= 0 {
            return Err(ExchangeError::Validation(
                "quantity must be > 0".to_string(),
            ));
        }
        if !self.broker_store.exists(&req.broker_id) {
            return Err(ExchangeError::BrokerNotFound);
        }

        let (order, trades) = match req.order_type {
            OrderType::Limit => {
                let price = req.price.ok_or_else(|| {
                    ExchangeError::Validation("price is required for limit orders".to_string())
                })?;
                if price <= Decimal::ZERO {
                    return Err(ExchangeError::Validation(
                        "price must be > 0".to_string(),
                    ));
                }
                let expires_at = req.expires_at.ok_or_else(|| {
                    ExchangeError::Validation(
                        "expires_at is required for limit orders".to_string(),
                    )
                })?;
                if expires_at <= Utc::now() {
                    return Err(ExchangeError::Validation(
                        "expires_at must be in the future".to_string(),
                    ));
                }
                let price_minor = decimal_to_minor(price)?;

                let (order, trades) = self.matcher.submit_limit_order(NewOrderRequest {
                    order_type: OrderType::Limit,
                    broker_id: req.broker_id.clone(),
                    document_number: req.document_number.clone(),
                    side: req.side,
                    symbol: req.symbol.clone(),
                    price: price_minor,
                    quantity: req.quantity,
                    expires_at: Some(expires_at),
                })?;

                let still_active = order.lock().expect("order lock poisoned").status.is_active();
                if still_active {
                    self.expiry.add(order.clone()).await;
                }
                (order, trades)
            }
            OrderType::Market => {
                if req.price.is_some() {
                    return Err(ExchangeError::Validation(
                        "price must be omitted for market orders".to_string(),
                    ));
                }
                if req.expires_at.is_some() {
                    return Err(ExchangeError::Validation(
                        "expires_at must be omitted for market orders".to_string(),
                    ));
                }
                self.matcher.submit_market_order(NewOrderRequest {
                    order_type: OrderType::Market,
                    broker_id: req.broker_id.clone(),
                    document_number: req.document_number.clone(),
                    side: req.side,
                    symbol: req.symbol.clone(),
                    price: 0,
                    quantity: req.quantity,
                    expires_at: None,
                })?
            }
        };

        self.dispatch_trade_webhooks(&req.symbol, &trades, &order);

        Ok(order)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<SharedOrder, ExchangeError> {
        self.order_store.get(order_id)
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<SharedOrder, ExchangeError> {
        let order = self.matcher.cancel_order(order_id)?;
        self.expiry.remove(order_id).await;
        self.webhook_svc
            .dispatch_order_cancelled(&OrderEventSnapshot::from_order(&order));
        Ok(order)
    }

    pub fn list_orders(
        &self,
        broker_id: &str,
        status: Option<OrderStatus>,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<SharedOrder>, usize), ExchangeError> {
        if !self.broker_store.exists(broker_id) {
            return Err(ExchangeError::BrokerNotFound);
        }
        Ok(self.order_store.list_by_broker(broker_id, status, page, limit))
    }

    /// For every trade leg belonging to the incoming order, dispatches a
    /// `trade.executed` webhook to the incoming broker and, by finding the
    /// counterpart trade row sharing the same trade id, to the resting
    /// order's broker as well.
    fn dispatch_trade_webhooks(&self, symbol: &str, trades: &[Trade], incoming: &SharedOrder) {
        if trades.is_empty() {
            return;
        }
        let incoming_snapshot = OrderEventSnapshot::from_order(incoming);
        let all_trades = self.trade_store.get_by_symbol(symbol);

        for trade in trades {
            self.webhook_svc.dispatch_trade_executed(
                &incoming_snapshot.broker_id,
                trade.trade_id,
                &incoming_snapshot,
                trade.price,
                trade.quantity,
                trade.executed_at,
            );

            if let Some(counterpart) = all_trades
                .iter()
                .find(|t| t.trade_id == trade.trade_id && t.order_id != trade.order_id)
            {
                if let Ok(counterpart_order) = self.order_store.get(counterpart.order_id) {
                    let counterpart_snapshot = OrderEventSnapshot::from_order(&counterpart_order);
                    self.webhook_svc.dispatch_trade_executed(
                        &counterpart_snapshot.broker_id,
                        counterpart.trade_id,
                        &counterpart_snapshot,
                        counterpart.price,
                        counterpart.quantity,
                        counterpart.executed_at,
                    );
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BookManager;
    use crate::domain::{Broker, Holding, SymbolRegistry};
    use crate::engine::expiry::ExpiryListener;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    struct NoopListener;
    impl ExpiryListener for NoopListener {
        fn on_order_expired(&self, _order: SharedOrder) {}
    }

    fn service() -> (OrderService, Arc<BrokerStore>) {
        let books = Arc::new(BookManager::new());
        let broker_store = Arc::new(BrokerStore::new());
        let order_store = Arc::new(OrderStore::new());
        let trade_store = Arc::new(TradeStore::new());
        let symbols = Arc::new(SymbolRegistry::new());

        let matcher = Arc::new(Matcher::new(
            books.clone(),
            broker_store.clone(),
            order_store.clone(),
            trade_store.clone(),
            symbols,
        ));
        let expiry = Arc::new(ExpiryManager::new(
            Duration::from_secs(60),
            books,
            broker_store.clone(),
            Arc::new(NoopListener),
        ));
        let webhook_store = Arc::new(crate::store::WebhookStore::new());
        let webhook_svc = Arc::new(WebhookService::new(
            webhook_store,
            broker_store.clone(),
            Duration::from_secs(5),
        ));

        let svc = OrderService::new(matcher, expiry, webhook_svc, order_store, broker_store.clone(), trade_store);
        (svc, broker_store)
    }

    fn limit_req(broker_id: &str, side: OrderSide, price: Decimal, quantity: i64) -> SubmitOrderRequest {
        SubmitOrderRequest {
            order_type: OrderType::Limit,
            broker_id: broker_id.to_string(),
            document_number: "DOC1".to_string(),
            side,
            symbol: "AAPL".to_string(),
            price: Some(price),
            quantity,
            expires_at: Some(Utc::now() + chrono::Duration::days(1)),
        }
    }

    #[tokio::test]
    async fn submit_limit_order_rests_and_tracks_expiry() {
        let (svc, broker_store) = service();
        broker_store
            .create(Arc::new(Broker::new("buyer".to_string(), 100_000, HashMap::new())))
            .unwrap();

        let order = svc
            .submit_order(limit_req("buyer", OrderSide::Bid, dec!(100.00), 10))
            .await
            .unwrap();
        assert_eq!(order.lock().unwrap().status, OrderStatus::Pending);
        assert_eq!(svc.expiry.active_order_count().await, 1);
    }

    #[tokio::test]
    async fn submit_order_rejects_bad_symbol() {
        let (svc, broker_store) = service();
        broker_store
            .create(Arc::new(Broker::new("buyer".to_string(), 100_000, HashMap::new())))
            .unwrap();

        let mut req = limit_req("buyer", OrderSide::Bid, dec!(100.00), 10);
        req.symbol = "too-long-for-a-ticker".to_string();
        let err = svc.submit_order(req).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_limit_order_rejects_past_expiry() {
        let (svc, broker_store) = service();
        broker_store
            .create(Arc::new(Broker::new("buyer".to_string(), 100_000, HashMap::new())))
            .unwrap();

        let mut req = limit_req("buyer", OrderSide::Bid, dec!(100.00), 10);
        req.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let err = svc.submit_order(req).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_market_order_rejects_explicit_price() {
        let (svc, broker_store) = service();
        broker_store
            .create(Arc::new(Broker::new("buyer".to_string(), 100_000, HashMap::new())))
            .unwrap();

        let req = SubmitOrderRequest {
            order_type: OrderType::Market,
            broker_id: "buyer".to_string(),
            document_number: "DOC1".to_string(),
            side: OrderSide::Bid,
            symbol: "AAPL".to_string(),
            price: Some(dec!(100.00)),
            quantity: 5,
            expires_at: None,
        };
        let err = svc.submit_order(req).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
    }

    #[tokio::test]
    async fn crossing_order_dispatches_webhooks_to_both_brokers() {
        let (svc, broker_store) = service();
        broker_store
            .create(Arc::new(Broker::new(
                "seller".to_string(),
                0,
                HashMap::from([("AAPL".to_string(), Holding { quantity: 10, reserved_quantity: 0 })]),
            )))
            .unwrap();
        broker_store
            .create(Arc::new(Broker::new("buyer".to_string(), 100_000, HashMap::new())))
            .unwrap();

        svc.submit_order(limit_req("seller", OrderSide::Ask, dec!(100.00), 10))
            .await
            .unwrap();
        let order = svc
            .submit_order(limit_req("buyer", OrderSide::Bid, dec!(100.00), 10))
            .await
            .unwrap();
        assert_eq!(order.lock().unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn cancel_order_removes_from_expiry_horizon() {
        let (svc, broker_store) = service();
        broker_store
            .create(Arc::new(Broker::new("buyer".to_string(), 100_000, HashMap::new())))
            .unwrap();

        let order = svc
            .submit_order(limit_req("buyer", OrderSide::Bid, dec!(100.00), 10))
            .await
            .unwrap();
        let order_id = order.lock().unwrap().order_id;

        svc.cancel_order(order_id).await.unwrap();
        assert_eq!(svc.expiry.active_order_count().await, 0);
        assert_eq!(order.lock().unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn list_orders_requires_known_broker() {
        let (svc, _) = service();
        let err = svc.list_orders("nope", None, 1, 10).unwrap_err();
        assert_eq!(err, ExchangeError::BrokerNotFound);
    }
}
