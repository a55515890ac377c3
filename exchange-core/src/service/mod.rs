//! Request-shape validation plus the four services that sit between the
//! external request layer and the correctness-critical engine: broker
//! registration/balances, order submission/lifecycle, stock quoting, and
//! webhook subscription management.

pub mod broker;
pub mod order;
pub mod stock;
pub mod webhook;

pub use broker::{BalanceResponse, BrokerService, HoldingBalance, HoldingInput, RegisterBrokerRequest};
pub use order::{OrderService, SubmitOrderRequest};
pub use stock::{BookPriceLevel, BookResponse, PriceResponse, QuotePriceLevel, QuoteResponse, StockService};
pub use webhook::{OrderEventSnapshot, UpsertWebhookRequest, WebhookService};
