// =============================================================================
// Residuals
// =============================================================================

use ndarray::Array1;

use crate::families::Family;

/// Response residuals: y - μ
pub fn resid_response(y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64> {
    y - mu
}

/// Deviance residuals: sign(y - μ) √d(y, μ)
///
/// Their squares sum to the deviance.
pub fn resid_deviance(y: &Array1<f64>, mu: &Array1<f64>, family: &dyn Family) -> Array1<f64> {
    y.iter()
        .zip(mu.iter())
        .map(|(&yi, &mui)| {
            let d = family.unit_deviance(yi, mui).max(0.0);
            (yi - mui).signum() * d.sqrt()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{GammaFamily, GaussianFamily};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_gaussian_deviance_residuals_are_raw() {
        let y = array![1.0, 3.0, 2.0];
        let mu = array![1.5, 2.0, 2.0];
        let r = resid_response(&y, &mu);
        let d = resid_deviance(&y, &mu, &GaussianFamily);
        for (a, b) in d.iter().zip(r.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gamma_deviance_residuals_square_to_deviance() {
        let y = array![1.0, 4.0, 2.5, 0.7];
        let mu = array![1.5, 3.0, 2.5, 1.0];
        let d = resid_deviance(&y, &mu, &GammaFamily);
        assert_abs_diff_eq!(
            d.mapv(|v| v * v).sum(),
            GammaFamily.deviance(&y, &mu),
            epsilon = 1e-12
        );
        assert!(d[0] < 0.0 && d[1] > 0.0);
        assert_eq!(d[2], 0.0);
    }
}
