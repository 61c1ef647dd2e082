//! Statistical confidence for control/test comparisons.
//!
//! Both calculators reduce the observed difference to a z statistic and
//! map it through the standard normal CDF to a two-sided confidence
//! percentage (z ≈ 1.96 → ≈95). Every undefined case is `None`, never a
//! divide-by-zero or a fabricated number.

/// Confidence that the test conversion rate differs from control.
///
/// Treats the two groups as independent binomial proportions and uses the
/// pooled standard error. Returns `None` when either group is empty or
/// the pooled standard error degenerates to zero.
#[must_use]
pub fn two_proportion_confidence(
    control_size: u64,
    control_conversions: u64,
    test_size: u64,
    test_conversions: u64,
) -> Option<f64> {
    if control_size == 0 || test_size == 0 {
        return None;
    }
    let n1 = control_size as f64;
    let n2 = test_size as f64;
    let p1 = control_conversions as f64 / n1;
    let p2 = test_conversions as f64 / n2;

    let pooled = (control_conversions + test_conversions) as f64 / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if !se.is_finite() || se == 0.0 {
        // Every row converted (or none did), or repeat conversions pushed
        // the pooled rate past 1; there is no binomial spread to test.
        return None;
    }

    Some(confidence_from_z((p2 - p1) / se))
}

/// Confidence that the test group's mean differs from control's.
///
/// Welch-style z on the difference of sample means. Returns `None` when
/// either group is empty, or when both variances are zero and the means
/// are equal (degenerate: confidence is undefined rather than 100%).
#[must_use]
pub fn two_mean_confidence(
    control_size: u64,
    control_mean: f64,
    control_variance: f64,
    test_size: u64,
    test_mean: f64,
    test_variance: f64,
) -> Option<f64> {
    if control_size == 0 || test_size == 0 {
        return None;
    }
    let diff = test_mean - control_mean;
    let se = (control_variance / control_size as f64 + test_variance / test_size as f64).sqrt();
    if !se.is_finite() {
        return None;
    }
    if se == 0.0 {
        // No spread in either sample: identical means are undecidable,
        // distinct means are exactly the observed difference.
        return if diff == 0.0 { None } else { Some(100.0) };
    }

    Some(confidence_from_z(diff / se))
}

/// Relative improvement of test over control, as a percentage.
///
/// Defined only for a positive control value; otherwise `None` (absent,
/// not an error or an infinity).
#[must_use]
pub fn improvement(control_value: f64, test_value: f64) -> Option<f64> {
    if control_value > 0.0 {
        Some((test_value - control_value) / control_value * 100.0)
    } else {
        None
    }
}

/// Map a z statistic to a two-sided confidence percentage.
fn confidence_from_z(z: f64) -> f64 {
    (2.0 * normal_cdf(z.abs()) - 1.0) * 100.0
}

/// Standard normal CDF via the error function.
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz and Stegun error-function approximation (7.1.26).
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0
        - (a1 * t + a2 * t.powi(2) + a3 * t.powi(3) + a4 * t.powi(4) + a5 * t.powi(5))
            * (-x * x).exp();

    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_cdf_matches_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 0.01);
        assert!(normal_cdf(3.0) > 0.99);
        assert!(normal_cdf(-3.0) < 0.01);
    }

    #[test]
    fn z_of_1_96_maps_to_95_percent() {
        assert!((confidence_from_z(1.96) - 95.0).abs() < 0.2);
        assert!((confidence_from_z(-1.96) - 95.0).abs() < 0.2);
    }

    #[test]
    fn doubled_conversion_rate_is_significant_at_100_per_group() {
        // 10% control vs 20% test at n=100 each sits right at the edge of
        // the conventional 95% threshold.
        let confidence = two_proportion_confidence(100, 10, 100, 20).unwrap();
        assert!(confidence > 0.0);
        assert!(confidence > 90.0 && confidence < 99.0);
    }

    #[test]
    fn equal_rates_have_zero_confidence() {
        let confidence = two_proportion_confidence(1000, 100, 1000, 100).unwrap();
        assert!(confidence.abs() < 1e-3);
    }

    #[test]
    fn proportion_confidence_is_none_for_empty_groups() {
        assert_eq!(two_proportion_confidence(0, 0, 100, 20), None);
        assert_eq!(two_proportion_confidence(100, 10, 0, 0), None);
    }

    #[test]
    fn proportion_confidence_is_none_without_spread() {
        // Nobody converted anywhere: pooled rate 0, no spread.
        assert_eq!(two_proportion_confidence(50, 0, 50, 0), None);
        // Everybody converted: pooled rate 1.
        assert_eq!(two_proportion_confidence(50, 50, 50, 50), None);
    }

    #[test]
    fn mean_confidence_detects_a_clear_difference() {
        let confidence = two_mean_confidence(100, 1.0, 0.5, 100, 2.0, 0.5).unwrap();
        assert!(confidence > 99.0);
    }

    #[test]
    fn mean_confidence_is_none_for_empty_groups() {
        assert_eq!(two_mean_confidence(0, 0.0, 0.0, 100, 2.0, 0.5), None);
        assert_eq!(two_mean_confidence(100, 1.0, 0.5, 0, 0.0, 0.0), None);
    }

    #[test]
    fn mean_confidence_is_none_when_degenerate() {
        // Zero variance and zero difference: undefined, not 100%.
        assert_eq!(two_mean_confidence(10, 3.0, 0.0, 10, 3.0, 0.0), None);
    }

    #[test]
    fn mean_confidence_is_certain_for_distinct_constant_samples() {
        assert_eq!(
            two_mean_confidence(10, 3.0, 0.0, 10, 4.0, 0.0),
            Some(100.0)
        );
    }

    #[test]
    fn improvement_doubles_when_rate_doubles() {
        assert_eq!(improvement(0.1, 0.2), Some(100.0));
    }

    #[test]
    fn improvement_is_negative_when_test_is_worse() {
        assert_eq!(improvement(0.2, 0.1), Some(-50.0));
    }

    #[test]
    fn improvement_is_none_for_non_positive_control() {
        assert_eq!(improvement(0.0, 0.5), None);
        assert_eq!(improvement(-1.0, 0.5), None);
    }
}
