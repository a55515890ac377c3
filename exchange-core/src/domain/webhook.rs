//! Webhook subscription entity: a broker's registration for event
//! notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BrokerId, WebhookId};

/// Closed set of event names a broker may subscribe to.
pub const EVENT_TRADE_EXECUTED: &str = "trade.executed";
pub const EVENT_ORDER_EXPIRED: &str = "order.expired";
pub const EVENT_ORDER_CANCELLED: &str = "order.cancelled";

pub const VALID_EVENTS: [&str; 3] = [
    EVENT_TRADE_EXECUTED,
    EVENT_ORDER_EXPIRED,
    EVENT_ORDER_CANCELLED,
];

/// A single (broker, event) subscription to a delivery URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Webhook {
    pub webhook_id: WebhookId,
    pub broker_id: BrokerId,
    pub event: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
