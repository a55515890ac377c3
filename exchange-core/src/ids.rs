//! Opaque identifier newtypes.
//!
//! Order, trade, and webhook ids are assigned by the core itself (never by a
//! caller) and are modeled as UUIDv4-backed newtypes so they can't be mixed
//! up with each other or with caller-supplied strings at the type level.
//! They serialize as plain strings, matching the external string contract.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh, random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

opaque_id!(OrderId);
opaque_id!(TradeId);
opaque_id!(WebhookId);

/// Broker identity — caller-supplied, validated against
/// `^[A-Za-z0-9_-]{1,64}$` at the service boundary, never generated here.
pub type BrokerId = String;

/// Uppercase ticker symbol, validated against `^[A-Z]{1,10}$`.
pub type Symbol = String;

/// Broker-supplied reference number, validated against `^[A-Za-z0-9]{1,32}$`.
pub type DocumentNumber = String;
