//! Webhook subscription management and best-effort event delivery.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::webhook::VALID_EVENTS;
use crate::domain::{errors::ExchangeError, OrderSide, OrderStatus, SharedOrder, Webhook};
use crate::ids::{BrokerId, OrderId, TradeId, WebhookId};
use crate::money::minor_to_decimal;
use crate::store::{BrokerStore, WebhookStore};

/// Validated input for [`WebhookService::upsert`].
#[derive(Clone, Debug)]
pub struct UpsertWebhookRequest {
    pub broker_id: BrokerId,
    pub url: String,
    pub events: Vec<String>,
}

/// A read-only snapshot of the order fields a webhook payload needs,
/// assembled by the caller while it still holds the order's lock so
/// dispatch itself never has to re-lock anything.
#[derive(Clone, Debug)]
pub struct OrderEventSnapshot {
    pub broker_id: BrokerId,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub price: i64,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub cancelled_quantity: i64,
    pub remaining_quantity: i64,
    pub status: OrderStatus,
}

impl OrderEventSnapshot {
    /// Reads the fields a webhook payload needs while holding the order's
    /// lock just long enough to copy them out.
    pub fn from_order(order: &SharedOrder) -> Self {
        let guard = order.lock().expect("order lock poisoned");
        Self {
            broker_id: guard.broker_id.clone(),
            order_id: guard.order_id,
            symbol: guard.symbol.clone(),
            side: guard.side,
            price: guard.price,
            quantity: guard.quantity,
            filled_quantity: guard.filled_quantity,
            cancelled_quantity: guard.cancelled_quantity,
            remaining_quantity: guard.remaining_quantity,
            status: guard.status,
        }
    }
}

#[derive(Serialize)]
struct TradeExecutedPayload {
    event: &'static str,
    timestamp: String,
    data: TradeExecutedData,
}

#[derive(Serialize)]
struct TradeExecutedData {
    trade_id: TradeId,
    broker_id: BrokerId,
    order_id: OrderId,
    symbol: String,
    side: OrderSide,
    trade_price: Decimal,
    trade_quantity: i64,
    order_status: OrderStatus,
    order_filled_quantity: i64,
    order_remaining_quantity: i64,
}

#[derive(Serialize)]
struct OrderEventPayload {
    event: &'static str,
    timestamp: String,
    data: OrderEventData,
}

#[derive(Serialize)]
struct OrderEventData {
    broker_id: BrokerId,
    order_id: OrderId,
    symbol: String,
    side: OrderSide,
    price: Decimal,
    quantity: i64,
    filled_quantity: i64,
    cancelled_quantity: i64,
    remaining_quantity: i64,
    status: OrderStatus,
}

pub struct WebhookService {
    store: Arc<WebhookStore>,
    broker_store: Arc<BrokerStore>,
    client: reqwest::Client,
}

impl WebhookService {
    pub fn new(store: Arc<WebhookStore>, broker_store: Arc<BrokerStore>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("webhook http client");
        Self {
            store,
            broker_store,
            client,
        }
    }

    /// Validates the request and upserts a subscription for each requested
    /// event, deduplicating events while preserving their original order.
    /// Returns the resulting subscriptions and whether any were newly
    /// created (vs. updated or left untouched).
    pub fn upsert(&self, req: UpsertWebhookRequest) -> Result<(Vec<Webhook>, bool), ExchangeError> {
        if !self.broker_store.exists(&req.broker_id) {
            return Err(ExchangeError::BrokerNotFound);
        }
        validate_url(&req.url)?;
        if req.events.is_empty() {
            return Err(ExchangeError::Validation(
                "events must be a non-empty array".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::with_capacity(req.events.len());
        let mut deduped = Vec::with_capacity(req.events.len());
        for event in &req.events {
            if !VALID_EVENTS.contains(&event.as_str()) {
                return Err(ExchangeError::Validation(format!(
                    "unknown event type: {event}. Must be one of: trade.executed, order.expired, order.cancelled"
                )));
            }
            if seen.insert(event.clone()) {
                deduped.push(event.clone());
            }
        }

        let mut any_created = false;
        let mut webhooks = Vec::with_capacity(deduped.len());
        for event in deduped {
            let (webhook, created) = self.store.upsert(&req.broker_id, &event, &req.url);
            any_created |= created;
            webhooks.push(webhook);
        }

        Ok((webhooks, any_created))
    }

    pub fn list(&self, broker_id: &str) -> Result<Vec<Webhook>, ExchangeError> {
        if !self.broker_store.exists(broker_id) {
            return Err(ExchangeError::BrokerNotFound);
        }
        Ok(self.store.list_by_broker(broker_id))
    }

    pub fn delete(&self, webhook_id: WebhookId) -> Result<(), ExchangeError> {
        self.store.delete(webhook_id)
    }

    /// Fire-and-forget: looks up the broker's subscription for
    /// `trade.executed` and, if one exists, spawns delivery.
    pub fn dispatch_trade_executed(
        &self,
        broker_id: &str,
        trade_id: TradeId,
        order: &OrderEventSnapshot,
        trade_price: i64,
        trade_quantity: i64,
        executed_at: chrono::DateTime<chrono::Utc>,
    ) {
        let Some(webhook) = self.store.get_by_broker_event(broker_id, "trade.executed") else {
            return;
        };
        let payload = TradeExecutedPayload {
            event: "trade.executed",
            timestamp: executed_at.to_rfc3339(),
            data: TradeExecutedData {
                trade_id,
                broker_id: broker_id.to_string(),
                order_id: order.order_id,
                symbol: order.symbol.clone(),
                side: order.side,
                trade_price: minor_to_decimal(trade_price),
                trade_quantity,
                order_status: order.status,
                order_filled_quantity: order.filled_quantity,
                order_remaining_quantity: order.remaining_quantity,
            },
        };
        self.spawn_delivery(webhook, "trade.executed", payload);
    }

    pub fn dispatch_order_expired(&self, order: &OrderEventSnapshot) {
        self.dispatch_order_event("order.expired", order);
    }

    pub fn dispatch_order_cancelled(&self, order: &OrderEventSnapshot) {
        self.dispatch_order_event("order.cancelled", order);
    }

    fn dispatch_order_event(&self, event: &'static str, order: &OrderEventSnapshot) {
        let Some(webhook) = self.store.get_by_broker_event(&order.broker_id, event) else {
            return;
        };
        let payload = OrderEventPayload {
            event,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data: OrderEventData {
                broker_id: order.broker_id.clone(),
                order_id: order.order_id,
                symbol: order.symbol.clone(),
                side: order.side,
                price: minor_to_decimal(order.price),
                quantity: order.quantity,
                filled_quantity: order.filled_quantity,
                cancelled_quantity: order.cancelled_quantity,
                remaining_quantity: order.remaining_quantity,
                status: order.status,
            },
        };
        self.spawn_delivery(webhook, event, payload);
    }

    fn spawn_delivery(&self, webhook: Webhook, event_type: &'static str, payload: impl Serialize + Send + 'static) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let body = match serde_json::to_vec(&payload) {
                Ok(body) => body,
                Err(_) => return,
            };
            let _ = client
                .post(&webhook.url)
                .header("Content-Type", "application/json")
                .header("X-Delivery-Id", Uuid::new_v4().to_string())
                .header("X-Webhook-Id", webhook.webhook_id.to_string())
                .header("X-Event-Type", event_type)
                .body(body)
                .send()
                .await;
        });
    }
}

fn validate_url(url: &str) -> Result<(), ExchangeError> {
    if url.is_empty() {
        return Err(ExchangeError::Validation("url is required".to_string()));
    }
    if url.len() > 2048 {
        return Err(ExchangeError::Validation(
            "url must be at most 2048 characters".to_string(),
        ));
    }
    if !url.starts_with("https://") || url.contains(char::is_whitespace) {
        return Err(ExchangeError::Validation(
            "url must be an absolute https URL".to_string(),
        ));
    }
    let host = &url["https://".len()..];
    if host.is_empty() || host.starts_with('/') {
        return Err(ExchangeError::Validation(
            "url must be an absolute https URL".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Broker;
    use std::collections::HashMap;

    fn services() -> (WebhookService, Arc<BrokerStore>) {
        let broker_store = Arc::new(BrokerStore::new());
        broker_store
            .create(Arc::new(Broker::new("b1".to_string(), 0, HashMap::new())))
            .unwrap();
        let webhook_store = Arc::new(WebhookStore::new());
        let svc = WebhookService::new(webhook_store, broker_store.clone(), Duration::from_secs(5));
        (svc, broker_store)
    }

    #[test]
    fn upsert_rejects_unknown_broker() {
        let (svc, _) = services();
        let err = svc
            .upsert(UpsertWebhookRequest {
                broker_id: "missing".to_string(),
                url: "https://example.com/hook".to_string(),
                events: vec!["trade.executed".to_string()],
            })
            .unwrap_err();
        assert_eq!(err, ExchangeError::BrokerNotFound);
    }

    #[test]
    fn upsert_rejects_non_https_url() {
        let (svc, _) = services();
        let err = svc
            .upsert(UpsertWebhookRequest {
                broker_id: "b1".to_string(),
                url: "http://example.com/hook".to_string(),
                events: vec!["trade.executed".to_string()],
            })
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
    }

    #[test]
    fn upsert_rejects_unknown_event() {
        let (svc, _) = services();
        let err = svc
            .upsert(UpsertWebhookRequest {
                broker_id: "b1".to_string(),
                url: "https://example.com/hook".to_string(),
                events: vec!["not.an.event".to_string()],
            })
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
    }

    #[test]
    fn upsert_dedupes_events_and_creates() {
        let (svc, _) = services();
        let (webhooks, created) = svc
            .upsert(UpsertWebhookRequest {
                broker_id: "b1".to_string(),
                url: "https://example.com/hook".to_string(),
                events: vec!["trade.executed".to_string(), "trade.executed".to_string()],
            })
            .unwrap();
        assert!(created);
        assert_eq!(webhooks.len(), 1);
    }

    #[test]
    fn list_and_delete_round_trip() {
        let (svc, _) = services();
        let (webhooks, _) = svc
            .upsert(UpsertWebhookRequest {
                broker_id: "b1".to_string(),
                url: "https://example.com/hook".to_string(),
                events: vec!["trade.executed".to_string()],
            })
            .unwrap();
        assert_eq!(svc.list("b1").unwrap().len(), 1);
        svc.delete(webhooks[0].webhook_id).unwrap();
        assert!(svc.list("b1").unwrap().is_empty());
    }
}
