//! Time-based order expiration: a sorted horizon of resting limit orders,
//! processed by a single cooperative tick.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::interval;

use crate::book::BookManager;
use crate::domain::{OrderSide, OrderStatus, SharedOrder};
use crate::ids::OrderId;
use crate::store::BrokerStore;

/// Notified whenever a resting order is expired by the horizon tick, so the
/// service layer can fire an `order.expired` webhook without the engine
/// depending on the dispatch stack directly.
pub trait ExpiryListener: Send + Sync {
    fn on_order_expired(&self, order: SharedOrder);
}

/// Sorted (by `expires_at` ascending) list of live limit orders, ticked at a
/// configurable interval to expire anything past its deadline.
pub struct ExpiryManager {
    interval: std::time::Duration,
    books: Arc<BookManager>,
    broker_store: Arc<BrokerStore>,
    listener: Arc<dyn ExpiryListener>,
    active_orders: AsyncMutex<Vec<SharedOrder>>,
}

impl ExpiryManager {
    pub fn new(
        interval: std::time::Duration,
        books: Arc<BookManager>,
        broker_store: Arc<BrokerStore>,
        listener: Arc<dyn ExpiryListener>,
    ) -> Self {
        Self {
            interval,
            books,
            broker_store,
            listener,
            active_orders: AsyncMutex::new(Vec::new()),
        }
    }

    /// Inserts a limit order into the sorted horizon. A no-op for orders
    /// without an `expires_at` (which market orders never carry).
    pub async fn add(&self, order: SharedOrder) {
        let expires_at = {
            let guard = order.lock().expect("order lock poisoned");
            match guard.expires_at {
                Some(deadline) => deadline,
                None => return,
            }
        };

        let mut active = self.active_orders.lock().await;
        let idx = active
            .partition_point(|existing| {
                existing.lock().expect("order lock poisoned").expires_at.unwrap() <= expires_at
            });
        active.insert(idx, order);
    }

    /// Removes an order from the horizon by id, e.g. after an explicit
    /// cancellation. A no-op if the order isn't tracked (already expired,
    /// filled, or never rested).
    pub async fn remove(&self, order_id: OrderId) {
        let mut active = self.active_orders.lock().await;
        if let Some(idx) = active
            .iter()
            .position(|o| o.lock().expect("order lock poisoned").order_id == order_id)
        {
            active.remove(idx);
        }
    }

    #[cfg(test)]
    pub async fn active_order_count(&self) -> usize {
        self.active_orders.lock().await.len()
    }

    /// Spawns the background tick task. Runs until `shutdown` fires.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn tick(&self) {
        let now = Utc::now();
        let to_expire = {
            let mut active = self.active_orders.lock().await;
            let cutoff = active.partition_point(|order| {
                order.lock().expect("order lock poisoned").expires_at.unwrap() <= now
            });
            active.drain(..cutoff).collect::<Vec<_>>()
        };

        for order in to_expire {
            self.expire_order(order).await;
        }
    }

    async fn expire_order(&self, order: SharedOrder) {
        let symbol = {
            let guard = order.lock().expect("order lock poisoned");
            if !guard.status.is_active() {
                return;
            }
            guard.symbol.clone()
        };

        let book_ref = self.books.get_or_create(&symbol);
        let (broker_id, side, price, cancelled_quantity) = {
            let mut book = book_ref.write().expect("book lock poisoned");
            let mut guard = order.lock().expect("order lock poisoned");

            if !guard.status.is_active() {
                return;
            }

            guard.cancelled_quantity = guard.remaining_quantity;
            guard.remaining_quantity = 0;
            guard.status = OrderStatus::Expired;
            guard.expired_at = guard.expires_at;

            book.remove(guard.order_id);

            (
                guard.broker_id.clone(),
                guard.side,
                guard.price,
                guard.cancelled_quantity,
            )
        };

        match self.broker_store.get(&broker_id) {
            Ok(broker) => {
                let mut state = broker.lock();
                match side {
                    OrderSide::Bid => state.reserved_cash -= price * cancelled_quantity,
                    OrderSide::Ask => {
                        if let Some(holding) = state.holdings.get_mut(&symbol) {
                            holding.reserved_quantity -= cancelled_quantity;
                        }
                    }
                }
            }
            Err(_) => {
                tracing::warn!(%broker_id, "broker absent at expiry time, skipping reservation release");
            }
        }

        self.listener.on_order_expired(order);
    }
}
