// =============================================================================
// IRLS: Iteratively Reweighted Least Squares
// =============================================================================
//
// Every model in the report is fitted by some version of this loop.
//
// THE BIG PICTURE
// ---------------
// We want β that maximizes the likelihood of the data. For a GLM there is no
// closed form, so we iterate:
//
//     Start with initial guess μ⁰ (from the family)
//     Repeat:
//         1. Compute "working weights" W from the variance and link
//         2. Compute "working response" z (linearized version of problem)
//         3. Solve penalized weighted least squares: (X'WX + S)β = X'Wz
//         4. Update η = Xβ, μ = g⁻¹(η)
//         5. Check if the deviance stopped moving; if not, go to step 1
//
// For Gaussian/identity the weights are all one and z = y, so the loop
// finishes after a single solve. For Gamma/log the weights are constant too
// (V(μ) g'(μ)² = μ² / μ² = 1) but the working response changes with μ.
//
// THE WORKING RESPONSE
// --------------------
//     z = η + (y - μ) × g'(μ)
//
// STEP HALVING
// ------------
// If an update increases the deviance we blend the old and new coefficient
// vectors, halving the step a few times, and keep the best blend.
//
// =============================================================================

use nalgebra::DVector;
use ndarray::{Array1, Array2};
use tracing::debug;

use crate::constants::{DEVIANCE_GROWTH_TOL, MAX_IRLS_WEIGHT, ZERO_TOL};
use crate::convert::{solve_and_invert, to_array1, to_array2, to_dmatrix};
use crate::error::{Result, StatsError};
use crate::families::Family;
use crate::links::Link;

use super::initialize_mu_safe;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration options for the IRLS algorithm.
#[derive(Debug, Clone)]
pub struct IRLSConfig {
    /// Maximum number of iterations before giving up.
    /// Default: 25 (usually converges much faster)
    pub max_iterations: usize,

    /// Convergence tolerance for deviance change.
    /// We stop when: |deviance_new - deviance_old| / deviance_old < tolerance
    /// Default: 1e-8
    pub tolerance: f64,

    /// Minimum value for weights to avoid numerical issues.
    /// Default: 1e-10
    pub min_weight: f64,
}

impl Default for IRLSConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-8,
            min_weight: 1e-10,
        }
    }
}

// =============================================================================
// Result Structure
// =============================================================================

/// Results from fitting a GLM using IRLS.
#[derive(Debug, Clone)]
pub struct IRLSResult {
    /// The fitted coefficients β
    pub coefficients: Array1<f64>,

    /// Fitted values μ = g⁻¹(Xβ)
    pub fitted_values: Array1<f64>,

    /// Linear predictor η = Xβ
    pub linear_predictor: Array1<f64>,

    /// Final deviance
    pub deviance: f64,

    /// Number of iterations until convergence
    pub iterations: usize,

    /// Did the algorithm converge?
    pub converged: bool,

    /// (X'WX + S)⁻¹, needed for standard errors: Var(β̂) = φ × (X'WX + S)⁻¹
    pub covariance_unscaled: Array2<f64>,

    /// Final IRLS weights
    pub irls_weights: Array1<f64>,

    /// Working response at convergence
    pub working_response: Array1<f64>,
}

// =============================================================================
// Main Fitting Functions
// =============================================================================

/// Fit an unpenalized GLM.
pub fn fit_glm(
    y: &Array1<f64>,
    x: &Array2<f64>,
    family: &dyn Family,
    link: &dyn Link,
    config: &IRLSConfig,
) -> Result<IRLSResult> {
    let p = x.ncols();
    fit_penalized_irls(y, x, &Array2::zeros((p, p)), family, link, config)
}

/// Penalized IRLS with a fixed penalty matrix S (p × p, already scaled by λ).
///
/// Shared by the plain GLM (S = 0) and the smooth-term solvers.
pub fn fit_penalized_irls(
    y: &Array1<f64>,
    x: &Array2<f64>,
    penalty: &Array2<f64>,
    family: &dyn Family,
    link: &dyn Link,
    config: &IRLSConfig,
) -> Result<IRLSResult> {
    // -------------------------------------------------------------------------
    // Step 0: Validate inputs
    // -------------------------------------------------------------------------
    let n = y.len();
    let p = x.ncols();

    if n == 0 {
        return Err(StatsError::EmptyInput("y is empty".to_string()));
    }
    if p == 0 {
        return Err(StatsError::EmptyInput("X has no columns".to_string()));
    }
    if x.nrows() != n {
        return Err(StatsError::DimensionMismatch(format!(
            "X has {} rows but y has {} elements",
            x.nrows(),
            n
        )));
    }
    if penalty.dim() != (p, p) {
        return Err(StatsError::DimensionMismatch(format!(
            "penalty is {:?} but X has {} columns",
            penalty.dim(),
            p
        )));
    }
    family.validate_response(y)?;

    // -------------------------------------------------------------------------
    // Step 1: Initialize μ and η
    // -------------------------------------------------------------------------
    let mut mu = family.initialize_mu(y);
    if !family.is_valid_mu(&mu) {
        mu = initialize_mu_safe(y, family);
    }
    let mut eta = link.link(&mu);
    let mut deviance = family.deviance(y, &mu);

    let mut converged = false;
    let mut iteration = 0;
    let mut coefficients: Array1<f64> = Array1::zeros(p);
    let mut cov_unscaled = Array2::zeros((p, p));
    let mut final_weights = Array1::ones(n);
    let mut working_response = Array1::zeros(n);

    // -------------------------------------------------------------------------
    // Step 2: IRLS iteration loop
    // -------------------------------------------------------------------------
    while iteration < config.max_iterations {
        iteration += 1;
        let deviance_old = deviance;

        // w = 1 / (V(μ) g'(μ)²), clipped away from 0 and ∞
        let irls_weights = compute_irls_weights(&mu, family, link, config.min_weight);
        working_response = compute_working_response(y, &mu, &eta, link);

        let (new_coef, xtwinv) = solve_weighted_least_squares_with_penalty_matrix(
            x,
            &working_response,
            &irls_weights,
            penalty,
        )?;

        let mu_new = family.clamp_mu(&link.inverse(&x.dot(&new_coef)));
        let deviance_new = family.deviance(y, &mu_new);

        coefficients = if iteration > 1 && deviance_new > deviance_old * DEVIANCE_GROWTH_TOL {
            step_halve(&coefficients, &new_coef, deviance_new, x, y, family, link)
        } else {
            new_coef
        };

        eta = x.dot(&coefficients);
        mu = family.clamp_mu(&link.inverse(&eta));
        deviance = family.deviance(y, &mu);
        cov_unscaled = xtwinv;
        final_weights = irls_weights;

        let rel_change = if deviance_old.abs() > ZERO_TOL {
            (deviance_old - deviance).abs() / deviance_old.abs()
        } else {
            (deviance_old - deviance).abs()
        };

        debug!(
            iteration,
            deviance,
            rel_change,
            family = family.name(),
            "IRLS iteration"
        );

        if rel_change < config.tolerance {
            converged = true;
            break;
        }
    }

    Ok(IRLSResult {
        coefficients,
        fitted_values: mu,
        linear_predictor: eta,
        deviance,
        iterations: iteration,
        converged,
        covariance_unscaled: cov_unscaled,
        irls_weights: final_weights,
        working_response,
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Blend old and new coefficients, halving the step five times, and keep
/// whichever blend gives the lowest deviance.
fn step_halve(
    old: &Array1<f64>,
    new: &Array1<f64>,
    deviance_new: f64,
    x: &Array2<f64>,
    y: &Array1<f64>,
    family: &dyn Family,
    link: &dyn Link,
) -> Array1<f64> {
    let mut step = 0.5;
    let mut best_coef = new.clone();
    let mut best_dev = deviance_new;

    for _ in 0..5 {
        let blended = old * (1.0 - step) + new * step;
        let mu_blend = family.clamp_mu(&link.inverse(&x.dot(&blended)));
        let dev_blend = family.deviance(y, &mu_blend);
        if dev_blend < best_dev {
            best_dev = dev_blend;
            best_coef = blended;
        }
        step *= 0.5;
    }
    best_coef
}

/// IRLS weights 1 / (V(μ) g'(μ)²).
pub(crate) fn compute_irls_weights(
    mu: &Array1<f64>,
    family: &dyn Family,
    link: &dyn Link,
    min_weight: f64,
) -> Array1<f64> {
    let variance = family.variance(mu);
    let link_deriv = link.derivative(mu);
    variance
        .iter()
        .zip(link_deriv.iter())
        .map(|(&v, &d)| (1.0 / (v * d * d)).clamp(min_weight, MAX_IRLS_WEIGHT))
        .collect()
}

/// Working response: z = η + (y - μ) × g'(μ)
pub(crate) fn compute_working_response(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    eta: &Array1<f64>,
    link: &dyn Link,
) -> Array1<f64> {
    let link_deriv = link.derivative(mu);
    eta.iter()
        .zip(y.iter())
        .zip(mu.iter())
        .zip(link_deriv.iter())
        .map(|(((&e, &yi), &mui), &d)| e + (yi - mui) * d)
        .collect()
}

/// X'WX for a diagonal weight vector.
pub(crate) fn compute_xtwx(x: &Array2<f64>, w: &Array1<f64>) -> Array2<f64> {
    let xw = x * &w.view().insert_axis(ndarray::Axis(1));
    x.t().dot(&xw)
}

/// Solve penalized weighted least squares: minimize Σ wᵢ(zᵢ - xᵢ'β)² + β'Sβ
///
/// Returns (coefficients, (X'WX + S)⁻¹).
pub(crate) fn solve_weighted_least_squares_with_penalty_matrix(
    x: &Array2<f64>,
    z: &Array1<f64>,
    w: &Array1<f64>,
    penalty: &Array2<f64>,
) -> Result<(Array1<f64>, Array2<f64>)> {
    let xtwx = compute_xtwx(x, w);
    let xtwz = x.t().dot(&(w * z));

    let a = to_dmatrix(&(xtwx + penalty));
    let b: DVector<f64> = DVector::from_iterator(xtwz.len(), xtwz.iter().copied());

    match solve_and_invert(&a, &b) {
        Some((coef, inv)) => Ok((to_array1(&coef), to_array2(&inv))),
        None => Err(StatsError::LinearAlgebraError(
            "Failed to solve penalized weighted least squares - matrix may be singular. \
             This often indicates collinear predictors or an empty factor level."
                .to_string(),
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
