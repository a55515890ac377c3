//! Broker entity: cash balance, reserved cash, and per-symbol holdings,
//! all guarded by a single per-broker mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::ids::{BrokerId, Symbol};

/// A broker's position in a single symbol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Holding {
    pub quantity: i64,
    pub reserved_quantity: i64,
}

impl Holding {
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }
}

/// The mutable part of a broker's account, serialized by `Broker`'s mutex.
#[derive(Debug, Default)]
pub struct BrokerState {
    pub cash_balance: i64,
    pub reserved_cash: i64,
    pub holdings: HashMap<Symbol, Holding>,
}

impl BrokerState {
    pub fn available_cash(&self) -> i64 {
        self.cash_balance - self.reserved_cash
    }

    /// Available (unreserved) quantity for `symbol`, or 0 if the broker
    /// has no holding in it.
    pub fn available_quantity(&self, symbol: &str) -> i64 {
        self.holdings.get(symbol).map(Holding::available).unwrap_or(0)
    }
}

/// A registered participant on the exchange.
///
/// Every mutation to cash, reserved cash, or holdings goes through
/// [`Broker::lock`]; readers that only need a consistent snapshot (e.g. a
/// balance query) take the same lock briefly rather than accepting a torn
/// read, since Rust's aliasing rules don't allow the lock-free shortcut the
/// original implementation takes for that one path.
#[derive(Debug)]
pub struct Broker {
    pub broker_id: BrokerId,
    pub created_at: DateTime<Utc>,
    state: Mutex<BrokerState>,
}

impl Broker {
    pub fn new(broker_id: BrokerId, initial_cash: i64, holdings: HashMap<Symbol, Holding>) -> Self {
        Self {
            broker_id,
            created_at: Utc::now(),
            state: Mutex::new(BrokerState {
                cash_balance: initial_cash,
                reserved_cash: 0,
                holdings,
            }),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().expect("broker lock poisoned")
    }
}

/// Shared handle to a broker, held by the broker store and cloned into
/// anything that needs to settle against it.
pub type SharedBroker = Arc<Broker>;
