//! Value-at-Risk and Expected Shortfall estimators.
//!
//! All results are reported as positive fractional losses over a one-day
//! horizon.

use statrs::distribution::{ContinuousCDF, Normal};

/// Trading days per year used to scale annual volatility to daily.
pub const TRADING_DAYS: f64 = 252.0;

/// z-score for the given confidence level. The two standard levels use the
/// conventional rounded constants; anything else inverts the normal CDF.
pub fn z_score(confidence: f64) -> f64 {
    if (confidence - 0.95).abs() < 1e-9 {
        1.645
    } else if (confidence - 0.99).abs() < 1e-9 {
        2.326
    } else {
        Normal::new(0.0, 1.0)
            .map(|n| n.inverse_cdf(confidence))
            .unwrap_or(1.645)
    }
}

/// Parametric one-day VaR for a normal portfolio return with the given
/// annualized volatility.
pub fn parametric_var(annual_volatility: f64, confidence: f64) -> f64 {
    let daily = annual_volatility / TRADING_DAYS.sqrt();
    (z_score(confidence) * daily).max(0.0)
}

/// Historical one-day VaR: the (1 - p) quantile of the sorted return series,
/// sign-flipped so losses read positive.
pub fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let index = quantile_index(sorted.len(), confidence);
    -sorted[index]
}

/// Expected Shortfall: mean of the losses at or below the VaR quantile,
/// reported positive.
pub fn expected_shortfall(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let index = quantile_index(sorted.len(), confidence);
    let tail_sum: f64 = sorted[..=index].iter().sum();
    -(tail_sum / (index + 1) as f64)
}

fn quantile_index(len: usize, confidence: f64) -> usize {
    let raw = ((1.0 - confidence) * len as f64) as usize;
    raw.min(len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn sample_returns() -> Vec<f64> {
        // 20 returns; the worst is -0.05.
        vec![
            -0.05, -0.03, -0.02, -0.015, -0.01, -0.008, -0.005, -0.002, 0.0, 0.001, 0.002,
            0.004, 0.006, 0.008, 0.01, 0.012, 0.015, 0.02, 0.025, 0.03,
        ]
    }

    #[test]
    fn historical_var_picks_the_tail_quantile() {
        let returns = sample_returns();
        // (1 - 0.95) * 20 = index 1 of the ascending sort.
        assert_relative_eq!(historical_var(&returns, 0.95), 0.03);
        // 99%: index 0, the single worst return.
        assert_relative_eq!(historical_var(&returns, 0.99), 0.05);
    }

    #[test]
    fn expected_shortfall_dominates_var() {
        let returns = sample_returns();
        for confidence in [0.90, 0.95, 0.99] {
            let var = historical_var(&returns, confidence);
            let es = expected_shortfall(&returns, confidence);
            assert!(es >= var, "ES {es} < VaR {var} at {confidence}");
            assert!(var >= 0.0);
        }
    }

    #[test]
    fn var_is_monotone_in_confidence() {
        let returns = sample_returns();
        assert!(historical_var(&returns, 0.99) >= historical_var(&returns, 0.95));
        assert!(parametric_var(0.20, 0.99) >= parametric_var(0.20, 0.95));
    }

    #[test]
    fn parametric_var_uses_rounded_z_scores() {
        let daily = 0.20 / TRADING_DAYS.sqrt();
        assert_relative_eq!(parametric_var(0.20, 0.95), 1.645 * daily);
        assert_relative_eq!(parametric_var(0.20, 0.99), 2.326 * daily);
    }

    #[test]
    fn custom_confidence_inverts_normal_cdf() {
        // z at 97.5% is about 1.96.
        assert_abs_diff_eq!(z_score(0.975), 1.96, epsilon = 1e-2);
    }

    #[test]
    fn empty_series_yields_zero() {
        assert_eq!(historical_var(&[], 0.95), 0.0);
        assert_eq!(expected_shortfall(&[], 0.95), 0.0);
    }

    #[test]
    fn single_observation_is_clamped() {
        assert_relative_eq!(historical_var(&[-0.02], 0.95), 0.02);
        assert_relative_eq!(expected_shortfall(&[-0.02], 0.95), 0.02);
    }
}
