// =============================================================================
// Autocorrelation
// =============================================================================
//
// Sample autocorrelation of a series x₁..xₙ in time order:
//
//     r(h) = Σₜ (xₜ - x̄)(xₜ₊ₕ - x̄) / Σₜ (xₜ - x̄)²
//
// The numerator is summed over the n - h available pairs but divided by the
// full-series sum of squares, so r(h) shrinks towards zero at long lags.
// Under white noise r(h) ≈ N(0, 1/n), giving the ±1.96/√n band.
//
// =============================================================================

use ndarray::Array1;

/// Default maximum lag: ⌊10 log₁₀ n⌋, never more than n - 1.
pub fn default_max_lag(n: usize) -> usize {
    if n < 2 {
        return 0;
    }
    let lag = (10.0 * (n as f64).log10()).floor() as usize;
    lag.min(n - 1)
}

/// Half-width of the approximate 95% white-noise band.
pub fn white_noise_band(n: usize) -> f64 {
    1.96 / (n as f64).sqrt()
}

/// Sample autocorrelations at lags 0..=max_lag. Lag 0 is always 1.
///
/// `max_lag` is truncated to n - 1. A constant series has no defined ACF
/// beyond lag 0 and yields NaN there.
pub fn acf(x: &Array1<f64>, max_lag: usize) -> Array1<f64> {
    let n = x.len();
    if n == 0 {
        return Array1::zeros(0);
    }
    let max_lag = max_lag.min(n - 1);
    let mean = x.sum() / n as f64;
    let centred: Vec<f64> = x.iter().map(|&v| v - mean).collect();
    let denom: f64 = centred.iter().map(|v| v * v).sum();

    (0..=max_lag)
        .map(|h| {
            if h == 0 {
                return 1.0;
            }
            if denom <= 0.0 {
                return f64::NAN;
            }
            let num: f64 = centred[..n - h]
                .iter()
                .zip(&centred[h..])
                .map(|(a, b)| a * b)
                .sum();
            num / denom
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_default_max_lag() {
        assert_eq!(default_max_lag(100), 20);
        assert_eq!(default_max_lag(360), 25);
        // capped at n - 1
        assert_eq!(default_max_lag(5), 4);
        assert_eq!(default_max_lag(1), 0);
    }

    #[test]
    fn test_alternating_series() {
        let x = array![1.0, -1.0, 1.0, -1.0];
        let r = acf(&x, 3);
        assert_eq!(r.len(), 4);
        assert_abs_diff_eq!(r[0], 1.0);
        assert_abs_diff_eq!(r[1], -0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(r[2], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(r[3], -0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_max_lag_truncated() {
        let x = array![1.0, 2.0, 3.0];
        assert_eq!(acf(&x, 10).len(), 3);
    }

    #[test]
    fn test_constant_series() {
        let r = acf(&array![2.0, 2.0, 2.0], 2);
        assert_eq!(r[0], 1.0);
        assert!(r[1].is_nan());
    }

    #[test]
    fn test_white_noise_band() {
        assert_abs_diff_eq!(white_noise_band(100), 0.196, epsilon = 1e-12);
    }
}
