//! Thread-safe in-memory store for orders: a primary index by order id and
//! a secondary, append-only chronological index per broker.

use dashmap::DashMap;

use crate::domain::{errors::ExchangeError, OrderStatus, SharedOrder};
use crate::ids::{BrokerId, OrderId};

#[derive(Default)]
pub struct OrderStore {
    orders: DashMap<OrderId, SharedOrder>,
    by_broker: DashMap<BrokerId, Vec<SharedOrder>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a freshly created order into both indexes. Orders are never
    /// removed once stored.
    pub fn create(&self, order: SharedOrder) {
        let (order_id, broker_id) = {
            let guard = order.lock().expect("order lock poisoned");
            (guard.order_id, guard.broker_id.clone())
        };
        self.orders.insert(order_id, order.clone());
        self.by_broker.entry(broker_id).or_default().push(order);
    }

    pub fn get(&self, order_id: OrderId) -> Result<SharedOrder, ExchangeError> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or(ExchangeError::OrderNotFound)
    }

    /// Returns orders for a broker in reverse chronological order (newest
    /// first), optionally filtered by status, 1-based paginated. Returns
    /// the page of matching orders and the total match count.
    pub fn list_by_broker(
        &self,
        broker_id: &str,
        status: Option<OrderStatus>,
        page: usize,
        limit: usize,
    ) -> (Vec<SharedOrder>, usize) {
        let all = self
            .by_broker
            .get(broker_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let filtered: Vec<SharedOrder> = all
            .into_iter()
            .rev()
            .filter(|order| match status {
                Some(wanted) => order.lock().expect("order lock poisoned").status == wanted,
                None => true,
            })
            .collect();

        let total = filtered.len();
        let start = (page.saturating_sub(1)) * limit;
        if start >= total {
            return (Vec::new(), total);
        }
        let end = (start + limit).min(total);
        (filtered[start..end].to_vec(), total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Order, OrderSide, OrderType};
    use crate::ids::Symbol;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    fn order(broker_id: &str, status: OrderStatus) -> SharedOrder {
        Arc::new(Mutex::new(Order {
            order_id: OrderId::new(),
            order_type: OrderType::Limit,
            broker_id: broker_id.to_string(),
            document_number: "DOC1".to_string(),
            side: OrderSide::Bid,
            symbol: "AAPL".to_string() as Symbol,
            price: 100,
            quantity: 1,
            filled_quantity: 0,
            remaining_quantity: 1,
            cancelled_quantity: 0,
            status,
            expires_at: None,
            created_at: Utc::now(),
            cancelled_at: None,
            expired_at: None,
            trades: Vec::new(),
        }))
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = OrderStore::new();
        let o = order("b1", OrderStatus::Pending);
        let id = o.lock().unwrap().order_id;
        store.create(o);
        assert_eq!(store.get(id).unwrap().lock().unwrap().order_id, id);
    }

    #[test]
    fn list_by_broker_is_newest_first_and_filters_by_status() {
        let store = OrderStore::new();
        let first = order("b1", OrderStatus::Filled);
        let second = order("b1", OrderStatus::Pending);
        let first_id = first.lock().unwrap().order_id;
        let second_id = second.lock().unwrap().order_id;
        store.create(first);
        store.create(second);

        let (all, total) = store.list_by_broker("b1", None, 1, 10);
        assert_eq!(total, 2);
        assert_eq!(all[0].lock().unwrap().order_id, second_id);
        assert_eq!(all[1].lock().unwrap().order_id, first_id);

        let (pending_only, pending_total) =
            store.list_by_broker("b1", Some(OrderStatus::Pending), 1, 10);
        assert_eq!(pending_total, 1);
        assert_eq!(pending_only[0].lock().unwrap().order_id, second_id);
    }

    #[test]
    fn pagination_beyond_total_is_empty() {
        let store = OrderStore::new();
        store.create(order("b1", OrderStatus::Pending));
        let (page, total) = store.list_by_broker("b1", None, 5, 10);
        assert_eq!(total, 1);
        assert!(page.is_empty());
    }
}
