//! Order entity, its lifecycle states, and the shared-mutable handle used
//! to reference a single order from the book, the stores, and the expiry
//! horizon simultaneously.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::trade::Trade;
use crate::ids::{BrokerId, DocumentNumber, OrderId, Symbol};

/// Distinguishes limit orders (which may rest on the book) from market
/// orders (always immediate-or-cancel, never rest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
}

/// Buy (`Bid`) or sell (`Ask`) side of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Bid,
    Ask,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Bid => OrderSide::Ask,
            OrderSide::Ask => OrderSide::Bid,
        }
    }
}

/// Lifecycle state of an order. See the state machine table in §4.4.5 of
/// the specification for valid transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// Terminal statuses are absorbing — no further mutation is valid.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }

    /// Pending or partially filled orders may still be cancelled or expired.
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PartiallyFilled)
    }
}

/// A bid or ask instruction submitted by a broker.
///
/// Mutated only while the owning symbol's book write lock is held by the
/// caller (the matcher, the cancel path, or the expiry tick); this struct's
/// own mutex exists only so Rust can share one logical order across the
/// book entry, the order store, the broker's per-broker order index, and
/// the expiry horizon without aliasing violations — it is never contended
/// in practice because the book lock already serializes every mutator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub broker_id: BrokerId,
    pub document_number: DocumentNumber,
    pub side: OrderSide,
    pub symbol: Symbol,
    /// Minor units. Zero for market orders.
    pub price: i64,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub remaining_quantity: i64,
    pub cancelled_quantity: i64,
    pub status: OrderStatus,
    /// Limit orders only.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub trades: Vec<Trade>,
}

impl Order {
    /// Volume-weighted average execution price for this order, using
    /// truncating integer division. `None` until at least one fill has
    /// been recorded.
    pub fn average_price(&self) -> Option<i64> {
        if self.trades.is_empty() || self.filled_quantity == 0 {
            return None;
        }
        let total: i64 = self.trades.iter().map(|t| t.price * t.quantity).sum();
        Some(total / self.filled_quantity)
    }
}

/// Shared handle to a single order, cloned cheaply and referenced from
/// every structure that needs to observe or mutate it.
pub type SharedOrder = Arc<Mutex<Order>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            order_id: OrderId::new(),
            order_type: OrderType::Limit,
            broker_id: "broker-a".to_string(),
            document_number: "DOC1".to_string(),
            side: OrderSide::Bid,
            symbol: "AAPL".to_string(),
            price: 15000,
            quantity: 10,
            filled_quantity: 0,
            remaining_quantity: 10,
            cancelled_quantity: 0,
            status: OrderStatus::Pending,
            expires_at: None,
            created_at: Utc::now(),
            cancelled_at: None,
            expired_at: None,
            trades: Vec::new(),
        }
    }

    #[test]
    fn average_price_is_none_without_fills() {
        let order = sample_order();
        assert_eq!(order.average_price(), None);
    }

    #[test]
    fn average_price_truncates() {
        let mut order = sample_order();
        order.filled_quantity = 3;
        order.trades = vec![
            Trade {
                trade_id: crate::ids::TradeId::new(),
                order_id: order.order_id,
                price: 100,
                quantity: 1,
                executed_at: Utc::now(),
            },
            Trade {
                trade_id: crate::ids::TradeId::new(),
                order_id: order.order_id,
                price: 101,
                quantity: 2,
                executed_at: Utc::now(),
            },
        ];
        // (100*1 + 101*2) / 3 = 302 / 3 = 100 (truncated)
        assert_eq!(order.average_price(), Some(100));
    }

    #[test]
    fn opposite_side_flips() {
        assert_eq!(OrderSide::Bid.opposite(), OrderSide::Ask);
        assert_eq!(OrderSide::Ask.opposite(), OrderSide::Bid);
    }

    #[test]
    fn terminal_and_active_classification() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Pending.is_active());
        assert!(OrderStatus::PartiallyFilled.is_active());
        assert!(!OrderStatus::Filled.is_active());
    }
}
