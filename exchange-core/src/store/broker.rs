//! Thread-safe in-memory store for brokers, keyed by broker id.

use dashmap::DashMap;

use crate::domain::{errors::ExchangeError, SharedBroker};
use crate::ids::BrokerId;

#[derive(Default)]
pub struct BrokerStore {
    brokers: DashMap<BrokerId, SharedBroker>,
}

impl BrokerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new broker. Fails with `BrokerAlreadyExists` if the id is
    /// already registered.
    pub fn create(&self, broker: SharedBroker) -> Result<(), ExchangeError> {
        match self.brokers.entry(broker.broker_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ExchangeError::BrokerAlreadyExists),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(broker);
                Ok(())
            }
        }
    }

    pub fn get(&self, broker_id: &str) -> Result<SharedBroker, ExchangeError> {
        self.brokers
            .get(broker_id)
            .map(|entry| entry.value().clone())
            .ok_or(ExchangeError::BrokerNotFound)
    }

    pub fn exists(&self, broker_id: &str) -> bool {
        self.brokers.contains_key(broker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Broker;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn broker(id: &str) -> SharedBroker {
        Arc::new(Broker::new(id.to_string(), 0, HashMap::new()))
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = BrokerStore::new();
        store.create(broker("b1")).unwrap();
        assert_eq!(store.get("b1").unwrap().broker_id, "b1");
    }

    #[test]
    fn duplicate_create_fails() {
        let store = BrokerStore::new();
        store.create(broker("b1")).unwrap();
        assert_eq!(
            store.create(broker("b1")).unwrap_err(),
            ExchangeError::BrokerAlreadyExists
        );
    }

    #[test]
    fn missing_get_fails() {
        let store = BrokerStore::new();
        assert_eq!(store.get("nope").unwrap_err(), ExchangeError::BrokerNotFound);
    }
}
