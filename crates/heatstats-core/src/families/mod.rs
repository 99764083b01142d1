// =============================================================================
// Distribution Families
// =============================================================================
//
// A GLM family describes the distribution of the response Y given its mean μ.
// IRLS only needs four things from a family:
//
//   - V(μ):  the variance function, Var(Y) = φ × V(μ)
//   - d(y,μ): the unit deviance, summed into the model deviance
//   - a way to start μ before the first iteration
//   - the valid range of μ (so we can clamp after each update)
//
// The report needs two families:
//
//   - Gaussian: the additive (spline) models of ocean heat content
//   - Gamma:    the storm-intensity model, positive right-skewed response
//
// =============================================================================

use ndarray::Array1;
use statrs::function::gamma::ln_gamma;

use crate::constants::MU_MIN_POSITIVE;
use crate::error::{Result, StatsError};

/// Behaviour every distribution family provides to the solvers.
pub trait Family: Send + Sync {
    /// Human-readable name ("Gaussian", "Gamma").
    fn name(&self) -> &str;

    /// Variance function V(μ).
    fn variance(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// Unit deviance d(y, μ) for a single observation.
    fn unit_deviance(&self, y: f64, mu: f64) -> f64;

    /// Total deviance D = Σ d(yᵢ, μᵢ).
    fn deviance(&self, y: &Array1<f64>, mu: &Array1<f64>) -> f64 {
        y.iter()
            .zip(mu.iter())
            .map(|(&yi, &mui)| self.unit_deviance(yi, mui))
            .sum()
    }

    /// Starting values for μ.
    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64>;

    /// Are all entries of μ inside the family's support?
    fn is_valid_mu(&self, mu: &Array1<f64>) -> bool;

    /// Project μ back into the family's support.
    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// Check the response is inside the family's support.
    fn validate_response(&self, y: &Array1<f64>) -> Result<()>;

    /// Is φ fixed at 1 (Poisson/Binomial style) rather than estimated?
    fn fixed_dispersion(&self) -> bool {
        false
    }

    /// Log-likelihood at the given dispersion φ.
    fn log_likelihood(&self, y: &Array1<f64>, mu: &Array1<f64>, scale: f64) -> f64;
}

// =============================================================================
// Gaussian
// =============================================================================

/// Gaussian family: V(μ) = 1. With the identity link this is least squares.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianFamily;

impl Family for GaussianFamily {
    fn name(&self) -> &str {
        "Gaussian"
    }

    fn variance(&self, mu: &Array1<f64>) -> Array1<f64> {
        Array1::ones(mu.len())
    }

    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        (y - mu).powi(2)
    }

    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64> {
        y.clone()
    }

    fn is_valid_mu(&self, mu: &Array1<f64>) -> bool {
        mu.iter().all(|m| m.is_finite())
    }

    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.clone()
    }

    fn validate_response(&self, y: &Array1<f64>) -> Result<()> {
        if y.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(StatsError::InvalidValue(
                "Gaussian response contains non-finite values".to_string(),
            ))
        }
    }

    /// ℓ = -n/2 log(2πφ) - Σ (y-μ)² / (2φ), with φ = σ².
    fn log_likelihood(&self, y: &Array1<f64>, mu: &Array1<f64>, scale: f64) -> f64 {
        let n = y.len() as f64;
        let rss = self.deviance(y, mu);
        -0.5 * n * (2.0 * std::f64::consts::PI * scale).ln() - rss / (2.0 * scale)
    }
}

// =============================================================================
// Gamma
// =============================================================================

/// Gamma family: V(μ) = μ².
///
/// The coefficient of variation is constant, so large responses are allowed
/// proportionally larger spread. Paired with the log link, effects are
/// multiplicative: exp(β) is the ratio of expected responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct GammaFamily;

impl Family for GammaFamily {
    fn name(&self) -> &str {
        "Gamma"
    }

    fn variance(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m * m)
    }

    /// d(y, μ) = 2 × [ -log(y/μ) + (y - μ)/μ ]
    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        2.0 * (-(y / mu).ln() + (y - mu) / mu)
    }

    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64> {
        y.mapv(|v| v.max(MU_MIN_POSITIVE))
    }

    fn is_valid_mu(&self, mu: &Array1<f64>) -> bool {
        mu.iter().all(|&m| m.is_finite() && m > 0.0)
    }

    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m.max(MU_MIN_POSITIVE))
    }

    fn validate_response(&self, y: &Array1<f64>) -> Result<()> {
        match y.iter().position(|&v| !(v.is_finite() && v > 0.0)) {
            None => Ok(()),
            Some(i) => Err(StatsError::InvalidValue(format!(
                "Gamma family requires strictly positive responses; observation {} is {}",
                i, y[i]
            ))),
        }
    }

    /// ℓ = Σ [ ν log(νy/μ) - νy/μ - log y - log Γ(ν) ], with shape ν = 1/φ.
    fn log_likelihood(&self, y: &Array1<f64>, mu: &Array1<f64>, scale: f64) -> f64 {
        let shape = 1.0 / scale;
        let lg = ln_gamma(shape);
        y.iter()
            .zip(mu.iter())
            .map(|(&yi, &mui)| {
                let ratio = shape * yi / mui;
                shape * ratio.ln() - ratio - yi.ln() - lg
            })
            .sum()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_gaussian_deviance_is_rss() {
        let y = array![1.0, 2.0, 3.0];
        let mu = array![1.5, 2.0, 2.0];
        assert_abs_diff_eq!(GaussianFamily.deviance(&y, &mu), 1.25, epsilon = 1e-12);
    }

    #[test]
    fn test_gamma_deviance_zero_at_perfect_fit() {
        let y = array![0.5, 2.0, 7.5];
        assert_abs_diff_eq!(GammaFamily.deviance(&y, &y), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gamma_variance_is_mu_squared() {
        let v = GammaFamily.variance(&array![2.0, 3.0]);
        assert_eq!(v, array![4.0, 9.0]);
    }

    #[test]
    fn test_gamma_rejects_non_positive_response() {
        let err = GammaFamily.validate_response(&array![1.0, 0.0, 2.0]).unwrap_err();
        assert!(matches!(err, StatsError::InvalidValue(_)));
        assert!(GammaFamily.validate_response(&array![0.1, 2.0]).is_ok());
    }

    #[test]
    fn test_gamma_log_likelihood_matches_exponential_case() {
        // Shape 1 (scale 1) is the exponential distribution: log f = -log μ - y/μ
        let y = array![1.0, 2.0];
        let mu = array![2.0, 2.0];
        let expected = (-(2.0_f64).ln() - 0.5) + (-(2.0_f64).ln() - 1.0);
        assert_abs_diff_eq!(
            GammaFamily.log_likelihood(&y, &mu, 1.0),
            expected,
            epsilon = 1e-10
        );
    }
}
