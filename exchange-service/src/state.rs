//! Assembles the stores, engine, and services once at startup and shares
//! the result across every request handler.

use std::sync::Arc;

use exchange_core::book::BookManager;
use exchange_core::domain::SharedOrder;
use exchange_core::engine::expiry::ExpiryListener;
use exchange_core::engine::{ExpiryManager, Matcher};
use exchange_core::service::{BrokerService, OrderService, StockService, WebhookService};
use exchange_core::store::{BrokerStore, OrderStore, TradeStore, WebhookStore};
use tokio::sync::watch;

use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub broker_service: Arc<BrokerService>,
    pub order_service: Arc<OrderService>,
    pub stock_service: Arc<StockService>,
    pub webhook_service: Arc<WebhookService>,
    pub expiry: Arc<ExpiryManager>,
}

/// Bridges an expired limit order back to the webhook layer without the
/// correctness-critical `exchange-core` crate depending on `reqwest` usage
/// sites directly.
struct WebhookExpiryListener {
    webhook_service: Arc<WebhookService>,
}

impl ExpiryListener for WebhookExpiryListener {
    fn on_order_expired(&self, order: SharedOrder) {
        let snapshot = exchange_core::service::webhook::OrderEventSnapshot::from_order(&order);
        self.webhook_service.dispatch_order_expired(&snapshot);
    }
}

impl AppState {
    pub fn new(settings: &Settings) -> Self {
        let books = Arc::new(BookManager::new());
        let broker_store = Arc::new(BrokerStore::new());
        let order_store = Arc::new(OrderStore::new());
        let trade_store = Arc::new(TradeStore::new());
        let webhook_store = Arc::new(WebhookStore::new());
        let symbols = Arc::new(exchange_core::domain::SymbolRegistry::new());

        let matcher = Arc::new(Matcher::new(
            books.clone(),
            broker_store.clone(),
            order_store.clone(),
            trade_store.clone(),
            symbols.clone(),
        ));

        let webhook_service = Arc::new(WebhookService::new(
            webhook_store,
            broker_store.clone(),
            settings.webhook_timeout(),
        ));

        let listener: Arc<dyn ExpiryListener> = Arc::new(WebhookExpiryListener {
            webhook_service: webhook_service.clone(),
        });
        let expiry = Arc::new(ExpiryManager::new(
            settings.expiration_interval(),
            books,
            broker_store.clone(),
            listener,
        ));

        let broker_service = Arc::new(BrokerService::new(broker_store.clone(), symbols.clone()));
        let order_service = Arc::new(OrderService::new(
            matcher.clone(),
            expiry.clone(),
            webhook_service.clone(),
            order_store,
            broker_store,
            trade_store.clone(),
        ));
        let stock_service = Arc::new(StockService::new(
            trade_store,
            matcher,
            settings.vwap_window(),
            symbols,
        ));

        Self {
            broker_service,
            order_service,
            stock_service,
            webhook_service,
            expiry,
        }
    }

    /// Starts the expiry tick, bounded by `shutdown`.
    pub fn start_expiry(&self, shutdown: watch::Receiver<bool>) {
        self.expiry.clone().start(shutdown);
    }
}
