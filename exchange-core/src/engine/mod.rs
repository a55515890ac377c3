//! The matching engine and the expiry horizon that drives time-based order
//! cancellation.

pub mod expiry;
pub mod matcher;

pub use expiry::ExpiryManager;
pub use matcher::{Matcher, NewOrderRequest, QuotePriceLevel, QuoteResult};
