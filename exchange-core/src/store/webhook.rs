//! Thread-safe in-memory store for webhook subscriptions.
//!
//! Keyed primarily by webhook id, with a secondary index over
//! (broker id, event name) so upserts can enforce that key's uniqueness.
//! Both indexes must stay consistent, so they share a single lock rather
//! than two independently-locked maps.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::domain::{errors::ExchangeError, Webhook};
use crate::ids::{BrokerId, WebhookId};

#[derive(Default)]
struct Inner {
    by_id: HashMap<WebhookId, Webhook>,
    by_broker_event: HashMap<(BrokerId, String), WebhookId>,
}

#[derive(Default)]
pub struct WebhookStore {
    inner: RwLock<Inner>,
}

impl WebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates a subscription keyed by (broker id, event).
    ///
    /// If a subscription already exists for that pair with the same url,
    /// it is a no-op. If the url differs, the existing row's url and
    /// `updated_at` are refreshed but its id stays stable. Otherwise a new
    /// subscription is created. Returns the resulting webhook and whether
    /// it was newly created.
    pub fn upsert(&self, broker_id: &str, event: &str, url: &str) -> (Webhook, bool) {
        let mut inner = self.inner.write().expect("webhook store lock poisoned");
        let key = (broker_id.to_string(), event.to_string());

        if let Some(existing_id) = inner.by_broker_event.get(&key).copied() {
            let existing = inner
                .by_id
                .get_mut(&existing_id)
                .expect("secondary index out of sync with primary");
            if existing.url != url {
                existing.url = url.to_string();
                existing.updated_at = Utc::now();
            }
            return (existing.clone(), false);
        }

        let now = Utc::now();
        let webhook = Webhook {
            webhook_id: WebhookId::new(),
            broker_id: broker_id.to_string(),
            event: event.to_string(),
            url: url.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.by_id.insert(webhook.webhook_id, webhook.clone());
        inner.by_broker_event.insert(key, webhook.webhook_id);
        (webhook, true)
    }

    pub fn get(&self, webhook_id: WebhookId) -> Result<Webhook, ExchangeError> {
        self.inner
            .read()
            .expect("webhook store lock poisoned")
            .by_id
            .get(&webhook_id)
            .cloned()
            .ok_or(ExchangeError::WebhookNotFound)
    }

    pub fn list_by_broker(&self, broker_id: &str) -> Vec<Webhook> {
        self.inner
            .read()
            .expect("webhook store lock poisoned")
            .by_id
            .values()
            .filter(|w| w.broker_id == broker_id)
            .cloned()
            .collect()
    }

    pub fn delete(&self, webhook_id: WebhookId) -> Result<(), ExchangeError> {
        let mut inner = self.inner.write().expect("webhook store lock poisoned");
        let webhook = inner
            .by_id
            .remove(&webhook_id)
            .ok_or(ExchangeError::WebhookNotFound)?;
        inner
            .by_broker_event
            .remove(&(webhook.broker_id, webhook.event));
        Ok(())
    }

    pub fn get_by_broker_event(&self, broker_id: &str, event: &str) -> Option<Webhook> {
        let inner = self.inner.read().expect("webhook store lock poisoned");
        let id = inner
            .by_broker_event
            .get(&(broker_id.to_string(), event.to_string()))?;
        inner.by_id.get(id).cloned()
    }
}
