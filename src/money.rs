//! Fixed-point money: everything is stored and reasoned about as `i64` minor units
//! ("kopecks"); the wire format is decimal rubles with two fractional digits.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// One ruble in kopecks.
const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Converts a decimal ruble amount into minor units, rounding half-away-from-zero.
///
/// Overflow (an amount that doesn't fit in an `i64` once scaled) is a programming error:
/// every amount that reaches this function is already bounded by a balance or accrual
/// invariant enforced elsewhere, so we panic rather than thread an error through call sites
/// that can't meaningfully recover from it.
pub fn to_minor(decimal: Decimal) -> i64 {
    let scaled = decimal * Decimal::from(MINOR_UNITS_PER_MAJOR);
    let rounded = scaled.round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    rounded.to_i64().expect("minor-unit amount overflowed i64")
}

/// Converts minor units back into a decimal ruble amount with exactly two fractional digits.
pub fn to_decimal(minor: i64) -> Decimal {
    Decimal::new(minor, 0) / Decimal::from(MINOR_UNITS_PER_MAJOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn round_trips_two_decimal_amounts() {
        for s in ["0", "0.01", "1.23", "100.50", "999999.99", "-45.67"] {
            let d = Decimal::from_str(s).unwrap();
            assert_eq!(to_decimal(to_minor(d)), d, "round trip failed for {s}");
        }
    }

    #[test]
    fn half_away_from_zero_rounding() {
        assert_eq!(to_minor(Decimal::from_str("1.005").unwrap()), 101);
        assert_eq!(to_minor(Decimal::from_str("-1.005").unwrap()), -101);
        assert_eq!(to_minor(Decimal::from_str("1.004").unwrap()), 100);
    }

    #[test]
    fn zero_is_zero() {
        assert_eq!(to_minor(Decimal::ZERO), 0);
        assert_eq!(to_decimal(0), Decimal::ZERO);
    }
}
