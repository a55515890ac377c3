//! Fixed-point conversion between decimal monetary input and integer minor
//! units (cents). Internal arithmetic always uses `i64` minor units; decimal
//! values only appear at the edges (request parsing, response rendering).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::errors::ExchangeError;

/// Converts a decimal dollar amount to integer cents.
///
/// Rejects any value carrying more than two fractional digits. Values with
/// exactly two (or fewer) fractional digits pass through rounding
/// half-to-even at the cents boundary, which is a no-op for already-exact
/// input but keeps the conversion total and well-defined for any `Decimal`
/// a caller might construct.
pub fn decimal_to_minor(amount: Decimal) -> Result<i64, ExchangeError> {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    if rounded != amount {
        return Err(ExchangeError::Validation(
            "monetary values must have at most 2 decimal places".to_string(),
        ));
    }

    let cents = rounded * Decimal::from(100);
    cents
        .to_i64()
        .ok_or_else(|| ExchangeError::Validation("monetary value out of range".to_string()))
}

/// Converts integer cents back to an exact decimal dollar amount.
pub fn minor_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn accepts_two_decimal_places() {
        assert_eq!(decimal_to_minor(dec!(150.00)).unwrap(), 15000);
        assert_eq!(decimal_to_minor(dec!(150.5)).unwrap(), 15050);
        assert_eq!(decimal_to_minor(dec!(0.01)).unwrap(), 1);
    }

    #[test]
    fn rejects_three_decimal_places() {
        assert!(decimal_to_minor(dec!(150.005)).is_err());
        assert!(decimal_to_minor(dec!(1.999)).is_err());
    }

    #[test]
    fn round_trip_is_exact() {
        for cents in [0_i64, 1, 99, 100, 15000, 12345678] {
            let back = decimal_to_minor(minor_to_decimal(cents)).unwrap();
            assert_eq!(back, cents);
        }
    }

    #[test]
    fn negative_amounts_round_trip() {
        assert_eq!(decimal_to_minor(dec!(-5.25)).unwrap(), -525);
    }
}
