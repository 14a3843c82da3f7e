//! Threshold evaluation.

use deltamon_core::{Classification, Delta};
use rust_decimal::Decimal;

/// Classify a delta against the thresholds.
///
/// Strict at both bounds: a delta equal to either threshold never alerts.
pub fn classify(delta: Delta, positive_threshold: Decimal, negative_threshold: Decimal) -> Classification {
    let value = delta.inner();
    if value > positive_threshold {
        Classification::High
    } else if value < negative_threshold {
        Classification::Low
    } else {
        Classification::None
    }
}

/// The threshold a classification refers to.
pub fn crossed_threshold(
    classification: Classification,
    positive_threshold: Decimal,
    negative_threshold: Decimal,
) -> Option<Decimal> {
    match classification {
        Classification::High => Some(positive_threshold),
        Classification::Low => Some(negative_threshold),
        Classification::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn c(d: Decimal) -> Classification {
        classify(Delta(d), dec!(0.08), dec!(-0.05))
    }

    #[test]
    fn test_reference_values() {
        assert_eq!(c(dec!(0.09)), Classification::High);
        assert_eq!(c(dec!(0.07)), Classification::None);
        assert_eq!(c(dec!(0.00)), Classification::None);
        assert_eq!(c(dec!(-0.04)), Classification::None);
        assert_eq!(c(dec!(-0.06)), Classification::Low);
    }

    #[test]
    fn test_bounds_are_strict() {
        assert_eq!(c(dec!(0.08)), Classification::None);
        assert_eq!(c(dec!(0.080)), Classification::None);
        assert_eq!(c(dec!(-0.05)), Classification::None);
        assert_eq!(c(dec!(0.0800001)), Classification::High);
        assert_eq!(c(dec!(-0.0500001)), Classification::Low);
    }

    #[test]
    fn test_crossed_threshold() {
        assert_eq!(
            crossed_threshold(Classification::High, dec!(0.08), dec!(-0.05)),
            Some(dec!(0.08))
        );
        assert_eq!(
            crossed_threshold(Classification::Low, dec!(0.08), dec!(-0.05)),
            Some(dec!(-0.05))
        );
        assert_eq!(crossed_threshold(Classification::None, dec!(0.08), dec!(-0.05)), None);
    }
}
