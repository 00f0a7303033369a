//! Money calculation utilities using rust_decimal for precision
//!
//! All monetary arithmetic is done using `Decimal` internally, then
//! converted to `f64` for storage/serialization.

use rust_decimal::prelude::*;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Lift an f64 into Decimal. Callers validate finiteness first; a
/// non-representable value degrades to zero rather than panicking.
pub fn dec(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Round to 2 decimal places, half away from zero
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Back to f64 for the storage boundary
pub fn to_money(value: Decimal) -> f64 {
    round2(value).to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(to_money(dec(10.005)), 10.01);
        assert_eq!(to_money(dec(10.004)), 10.0);
    }

    #[test]
    fn non_finite_degrades_to_zero() {
        assert_eq!(dec(f64::NAN), Decimal::ZERO);
        assert_eq!(dec(f64::INFINITY), Decimal::ZERO);
    }
}
