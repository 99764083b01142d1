// =============================================================================
// Link Functions
// =============================================================================
//
// The link g connects the mean to the linear predictor: η = g(μ).
//
//   - Identity: η = μ       (additive spline models of heat content)
//   - Log:      η = log(μ)  (Gamma storm model; keeps predictions positive)
//
// IRLS needs g, its inverse, and the derivative dη/dμ.
// =============================================================================

use ndarray::Array1;

/// Behaviour every link function provides to the solvers.
pub trait Link: Send + Sync {
    /// Human-readable name ("identity", "log").
    fn name(&self) -> &str;

    /// η = g(μ)
    fn link(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// μ = g⁻¹(η)
    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64>;

    /// dη/dμ evaluated at μ
    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64>;
}

/// Identity link: η = μ.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLink;

impl Link for IdentityLink {
    fn name(&self) -> &str {
        "identity"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.clone()
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        eta.clone()
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        Array1::ones(mu.len())
    }
}

/// Log link: η = log(μ).
///
/// The inverse exp(η) is strictly positive for every finite η, which is what
/// guarantees positive Gamma predictions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLink;

/// exp() overflows to +inf just above 709.
const MAX_ETA: f64 = 700.0;

impl Link for LogLink {
    fn name(&self) -> &str {
        "log"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(f64::ln)
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        eta.mapv(|e| e.clamp(-MAX_ETA, MAX_ETA).exp())
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| 1.0 / m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_log_link_roundtrip() {
        let mu = array![0.5, 1.0, 20.0];
        let back = LogLink.inverse(&LogLink.link(&mu));
        for (a, b) in mu.iter().zip(back.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_inverse_is_always_positive() {
        let mu = LogLink.inverse(&array![-1e6, -50.0, 0.0, 1e6]);
        assert!(mu.iter().all(|&m| m > 0.0 && m.is_finite()));
    }

    #[test]
    fn test_identity_derivative_is_one() {
        assert_eq!(IdentityLink.derivative(&array![3.0, -2.0]), array![1.0, 1.0]);
    }
}
