// =============================================================================
// Dispersion
// =============================================================================
//
// Var(Y) = φ × V(μ). For Gaussian φ = σ²; for Gamma φ = 1/shape (the squared
// coefficient of variation). Both are estimated, and the Pearson estimator
// is the one standard errors use.
//
// =============================================================================

use ndarray::Array1;

use crate::families::Family;

/// Pearson χ² = Σ (y - μ)² / V(μ)
pub fn pearson_chi2(y: &Array1<f64>, mu: &Array1<f64>, family: &dyn Family) -> f64 {
    let variance = family.variance(mu);
    y.iter()
        .zip(mu.iter())
        .zip(variance.iter())
        .map(|((&yi, &mui), &v)| (yi - mui).powi(2) / v)
        .sum()
}

/// φ̂ = Pearson χ² / residual df
pub fn estimate_dispersion_pearson(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    family: &dyn Family,
    df_resid: f64,
) -> f64 {
    if df_resid <= 0.0 {
        return f64::NAN;
    }
    pearson_chi2(y, mu, family) / df_resid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{GammaFamily, GaussianFamily};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_gaussian_pearson_is_rss() {
        let y = array![1.0, 2.0, 4.0];
        let mu = array![1.0, 3.0, 3.0];
        assert_abs_diff_eq!(pearson_chi2(&y, &mu, &GaussianFamily), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            estimate_dispersion_pearson(&y, &mu, &GaussianFamily, 1.0),
            2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_gamma_pearson_is_squared_relative_error() {
        let y = array![3.0, 1.0];
        let mu = array![2.0, 2.0];
        // (1/2)² + (-1/2)²
        assert_abs_diff_eq!(pearson_chi2(&y, &mu, &GammaFamily), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_non_positive_df_is_nan() {
        let y = array![1.0, 2.0];
        let mu = array![1.5, 1.5];
        assert!(estimate_dispersion_pearson(&y, &mu, &GaussianFamily, 0.0).is_nan());
    }
}
