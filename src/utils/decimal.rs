//! Decimal arithmetic utilities for capital and score calculations.

use rust_decimal::Decimal;

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Clamp a value into an inclusive range.
pub fn clamp_range(value: Decimal, min: Decimal, max: Decimal) -> Decimal {
    value.max(min).min(max)
}

/// Calculate weighted average over (value, weight) pairs.
pub fn weighted_average(values: &[(Decimal, Decimal)]) -> Decimal {
    let (sum, weight_sum) = values.iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(sum, weight_sum), (val, weight)| (sum + val * weight, weight_sum + weight),
    );

    safe_div(sum, weight_sum)
}

/// Mean absolute deviation of a sample. Zero for fewer than two points.
pub fn mean_abs_deviation(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }
    let n = Decimal::from(values.len());
    let mean = values.iter().copied().sum::<Decimal>() / n;
    values.iter().map(|v| (*v - mean).abs()).sum::<Decimal>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(dec!(15), dec!(1), dec!(10)), dec!(10));
        assert_eq!(clamp_range(dec!(-5), dec!(1), dec!(10)), dec!(1));
        assert_eq!(clamp_range(dec!(7), dec!(1), dec!(10)), dec!(7));
    }

    #[test]
    fn test_weighted_average() {
        let values = vec![(dec!(100), dec!(2)), (dec!(200), dec!(1))];
        let avg = weighted_average(&values);
        assert!(avg > dec!(133) && avg < dec!(134));
    }

    #[test]
    fn test_mean_abs_deviation() {
        assert_eq!(mean_abs_deviation(&[dec!(5)]), Decimal::ZERO);
        // mean = 10, deviations = 5, 5 -> mad = 5
        assert_eq!(mean_abs_deviation(&[dec!(5), dec!(15)]), dec!(5));
        // constant series has zero dispersion
        assert_eq!(
            mean_abs_deviation(&[dec!(3), dec!(3), dec!(3)]),
            Decimal::ZERO
        );
    }
}
