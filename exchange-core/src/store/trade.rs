//! Thread-safe in-memory store for trades, keyed by symbol as an
//! append-only chronological list.

use dashmap::DashMap;

use crate::domain::Trade;
use crate::ids::Symbol;

#[derive(Default)]
pub struct TradeStore {
    trades: DashMap<Symbol, Vec<Trade>>,
}

impl TradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, symbol: &str, trade: Trade) {
        self.trades.entry(symbol.to_string()).or_default().push(trade);
    }

    /// All trades for `symbol` in chronological order. Empty if the symbol
    /// has never traded.
    pub fn get_by_symbol(&self, symbol: &str) -> Vec<Trade> {
        self.trades
            .get(symbol)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}
