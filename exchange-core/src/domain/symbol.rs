//! Registry of known trading symbols, grown implicitly by order submission
//! and by broker registration that declares initial holdings.

use dashmap::DashSet;

use crate::ids::Symbol;

/// Thread-safe set of symbols that have ever been referenced by an order
/// or a broker's initial holdings. Symbols are never removed.
#[derive(Default)]
pub struct SymbolRegistry {
    symbols: DashSet<Symbol>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, symbol: &str) {
        self.symbols.insert(symbol.to_string());
    }

    pub fn exists(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_symbol_does_not_exist() {
        let registry = SymbolRegistry::new();
        assert!(!registry.exists("AAPL"));
    }

    #[test]
    fn registering_makes_it_exist() {
        let registry = SymbolRegistry::new();
        registry.register("AAPL");
        assert!(registry.exists("AAPL"));
    }
}
