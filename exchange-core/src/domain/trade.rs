//! Trade entity — a single execution leg reported against one order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, TradeId};

/// One leg of a matched execution.
///
/// Every match produces exactly two `Trade` records sharing a `trade_id`
/// but carrying different `order_id`s — one for the incoming order, one
/// for the resting order — so each side's trade history only ever lists
/// trades against its own orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub order_id: OrderId,
    /// Minor units, always > 0.
    pub price: i64,
    /// Always > 0.
    pub quantity: i64,
    pub executed_at: DateTime<Utc>,
}
