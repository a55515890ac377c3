//! Domain-level error kinds, propagated unchanged to the request layer.

use thiserror::Error;

/// Every way a core operation can fail.
///
/// The handler layer (`exchange-service`) maps each variant to an HTTP
/// status code; the core itself never does that translation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("broker already exists")]
    BrokerAlreadyExists,

    #[error("broker not found")]
    BrokerNotFound,

    #[error("symbol not found")]
    SymbolNotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("order is not cancellable")]
    OrderNotCancellable,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("insufficient holdings")]
    InsufficientHoldings,

    #[error("no liquidity available")]
    NoLiquidity,

    #[error("webhook not found")]
    WebhookNotFound,

    #[error("validation error: {0}")]
    Validation(String),
}
