//! Broker registration and balance queries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::{errors::ExchangeError, Holding, SharedBroker, SymbolRegistry};
use crate::ids::{BrokerId, Symbol};
use crate::money::decimal_to_minor;
use crate::store::BrokerStore;

static BROKER_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());
static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{1,10}$").unwrap());

/// A single (symbol, quantity) pair supplied at broker registration.
#[derive(Clone, Debug)]
pub struct HoldingInput {
    pub symbol: Symbol,
    pub quantity: i64,
}

/// Validated input for [`BrokerService::register`].
#[derive(Clone, Debug)]
pub struct RegisterBrokerRequest {
    pub broker_id: BrokerId,
    pub initial_cash: Decimal,
    pub initial_holdings: Vec<HoldingInput>,
}

/// A single holding row in [`BalanceResponse`].
#[derive(Clone, Copy, Debug)]
pub struct HoldingBalance {
    pub symbol_quantity: i64,
    pub reserved_quantity: i64,
    pub available_quantity: i64,
}

/// Snapshot of a broker's cash and holdings, as returned to the caller.
#[derive(Clone, Debug)]
pub struct BalanceResponse {
    pub broker_id: BrokerId,
    pub cash_balance: i64,
    pub reserved_cash: i64,
    pub available_cash: i64,
    pub holdings: Vec<(Symbol, HoldingBalance)>,
    pub updated_at: DateTime<Utc>,
}

pub struct BrokerService {
    store: Arc<BrokerStore>,
    symbols: Arc<SymbolRegistry>,
}

impl BrokerService {
    pub fn new(store: Arc<BrokerStore>, symbols: Arc<SymbolRegistry>) -> Self {
        Self { store, symbols }
    }

    /// Validates the request, creates the broker record, and registers any
    /// symbols named in its initial holdings.
    pub fn register(&self, req: RegisterBrokerRequest) -> Result<SharedBroker, ExchangeError> {
        if !BROKER_ID_RE.is_match(&req.broker_id) {
            return Err(ExchangeError::Validation(
                "broker_id must match ^[A-Za-z0-9_-]{1,64}$".to_string(),
            ));
        }
        if req.initial_cash < Decimal::ZERO {
            return Err(ExchangeError::Validation(
                "initial_cash must be >= 0".to_string(),
            ));
        }
        let cash_cents = decimal_to_minor(req.initial_cash)?;

        let mut holdings = HashMap::with_capacity(req.initial_holdings.len());
        for h in &req.initial_holdings {
            if !SYMBOL_RE.is_match(&h.symbol) {
                return Err(ExchangeError::Validation(format!(
                    "holding symbol must match ^[A-Z]{{1,10}}$, got {:?}",
                    h.symbol
                )));
            }
            if h.quantity <= 0 {
                return Err(ExchangeError::Validation(format!(
                    "holding quantity must be > 0 for symbol {}",
                    h.symbol
                )));
            }
            if holdings.contains_key(&h.symbol) {
                return Err(ExchangeError::Validation(format!(
                    "duplicate symbol in initial_holdings: {}",
                    h.symbol
                )));
            }
            holdings.insert(
                h.symbol.clone(),
                Holding {
                    quantity: h.quantity,
                    reserved_quantity: 0,
                },
            );
        }

        let broker = Arc::new(crate::domain::Broker::new(
            req.broker_id.clone(),
            cash_cents,
            holdings.clone(),
        ));
        self.store.create(broker.clone())?;

        for symbol in holdings.keys() {
            self.symbols.register(symbol);
        }

        Ok(broker)
    }

    /// Returns a point-in-time snapshot of a broker's balance, taking the
    /// broker's lock briefly rather than accepting a torn read.
    pub fn get_balance(&self, broker_id: &str) -> Result<BalanceResponse, ExchangeError> {
        let broker = self.store.get(broker_id)?;
        let state = broker.lock();

        let holdings = state
            .holdings
            .iter()
            .map(|(symbol, h)| {
                (
                    symbol.clone(),
                    HoldingBalance {
                        symbol_quantity: h.quantity,
                        reserved_quantity: h.reserved_quantity,
                        available_quantity: h.available(),
                    },
                )
            })
            .collect();

        Ok(BalanceResponse {
            broker_id: broker.broker_id.clone(),
            cash_balance: state.cash_balance,
            reserved_cash: state.reserved_cash,
            available_cash: state.available_cash(),
            holdings,
            updated_at: broker.created_at,
        })
    }
}
