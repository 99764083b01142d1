// =============================================================================
// Model Fit Statistics
// =============================================================================
//
// AIC = -2ℓ + 2k
// BIC = -2ℓ + k log(n)
//
// k counts every estimated parameter. For models with an estimated scale the
// caller includes φ in k, so a Gamma GLM with p coefficients uses k = p + 1.
//
// =============================================================================

use ndarray::Array1;

use crate::families::Family;

/// Akaike Information Criterion
pub fn aic(llf: f64, n_params: f64) -> f64 {
    -2.0 * llf + 2.0 * n_params
}

/// Bayesian Information Criterion
pub fn bic(llf: f64, n_params: f64, n_obs: usize) -> f64 {
    -2.0 * llf + n_params * (n_obs as f64).ln()
}

/// Deviance of the intercept-only model.
///
/// For the canonical-mean families used here the intercept-only fit is the
/// mean of y, whatever the link.
pub fn null_deviance(y: &Array1<f64>, family: &dyn Family) -> f64 {
    let Some(mean) = y.mean() else {
        return f64::NAN;
    };
    let mu = Array1::from_elem(y.len(), mean);
    family.deviance(y, &mu)
}

/// Proportion of null deviance explained: 1 - D / D₀
pub fn deviance_explained(deviance: f64, null_deviance: f64) -> f64 {
    if null_deviance <= 0.0 {
        return f64::NAN;
    }
    1.0 - deviance / null_deviance
}

/// Adjusted R² with the residual degrees of freedom of a penalized fit:
///
/// ```text
/// 1 - Var(y - μ̂) (n - 1) / (Var(y) × df_resid)
/// ```
pub fn adjusted_r_squared(y: &Array1<f64>, fitted: &Array1<f64>, residual_df: f64) -> f64 {
    let n = y.len();
    if n < 2 || residual_df <= 0.0 {
        return f64::NAN;
    }
    let centred_ss = |v: &Array1<f64>| {
        let m = v.sum() / n as f64;
        v.iter().map(|&x| (x - m).powi(2)).sum::<f64>()
    };
    let ss_y = centred_ss(y);
    if ss_y <= 0.0 {
        return f64::NAN;
    }
    let resid = y - fitted;
    1.0 - centred_ss(&resid) / ss_y * (n as f64 - 1.0) / residual_df
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{GammaFamily, GaussianFamily};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_aic_bic() {
        assert_abs_diff_eq!(aic(-10.0, 3.0), 26.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bic(-10.0, 2.0, 100), 20.0 + 2.0 * 100f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_null_deviance_gaussian_is_total_ss() {
        let y = array![1.0, 2.0, 3.0, 6.0];
        assert_abs_diff_eq!(null_deviance(&y, &GaussianFamily), 14.0, epsilon = 1e-12);
    }

    #[test]
    fn test_null_deviance_gamma_constant_response_is_zero() {
        let y = array![2.0, 2.0, 2.0];
        assert_abs_diff_eq!(null_deviance(&y, &GammaFamily), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deviance_explained() {
        assert_abs_diff_eq!(deviance_explained(2.5, 10.0), 0.75, epsilon = 1e-12);
        assert!(deviance_explained(1.0, 0.0).is_nan());
    }

    #[test]
    fn test_adjusted_r_squared_perfect_fit() {
        let y = array![1.0, 2.0, 4.0, 8.0];
        assert_abs_diff_eq!(adjusted_r_squared(&y, &y, 2.0), 1.0, epsilon = 1e-12);
        let mean = Array1::from_elem(4, 3.75);
        // Intercept-only fit explains nothing
        assert_abs_diff_eq!(adjusted_r_squared(&y, &mean, 3.0), 0.0, epsilon = 1e-12);
    }
}
