// =============================================================================
// Model Solvers
// =============================================================================
//
// This module contains the fitting algorithms behind the four report models.
//
// HOW FITTING WORKS (High-Level Overview)
// ---------------------------------------
//
// Every model has the form
//
//     g(E[Y]) = Xβ
//
// where X holds parametric columns (intercept, dummies) and, for additive
// models, the constrained basis columns of each smooth term. Smooth terms
// carry a penalty λⱼ βⱼ'Sⱼβⱼ so their wiggliness is chosen by the data:
//
//   - irls:          plain and penalized IRLS (Gamma/log storm model)
//   - gcv_optimizer: Brent's method and λ selection by GCV
//   - smooth_glm:    additive models with GCV-selected λ (models 1 and 2)
//   - ar1:           additive model with AR(1) errors, (ρ, λ) by REML (model 3)
//
// =============================================================================

mod ar1;
pub mod gcv_optimizer;
mod irls;
pub mod smooth_glm;

pub use ar1::{fit_ar1_smooth, whiten, whiten_columns, Ar1Config, Ar1SmoothResult};
pub use gcv_optimizer::{brent_minimize, BrentResult, MultiTermGCVOptimizer};
pub use irls::{fit_glm, fit_penalized_irls, IRLSConfig, IRLSResult};
pub use smooth_glm::{fit_smooth_glm, LambdaMethod, SmoothGLMConfig, SmoothGLMResult, SmoothTermData};

use ndarray::{s, Array1, Array2};
use std::ops::Range;

use crate::families::Family;

/// Safe initialization of μ that works for any family.
///
/// Used as fallback when `family.initialize_mu(y)` produces invalid values.
/// Computes a weighted average of each y_i with the global mean, then clamps
/// to the family's valid range.
pub(crate) fn initialize_mu_safe(y: &Array1<f64>, family: &dyn Family) -> Array1<f64> {
    let y_mean = y.mean().unwrap_or(1.0).max(0.01);
    let raw: Array1<f64> = y.mapv(|yi| (yi + y_mean) / 2.0);
    family.clamp_mu(&raw)
}

/// Column ranges of each block when `widths` columns are laid out after
/// `start` parametric columns.
pub(crate) fn block_ranges(start: usize, widths: impl IntoIterator<Item = usize>) -> Vec<Range<usize>> {
    let mut offset = start;
    widths
        .into_iter()
        .map(|w| {
            let range = offset..offset + w;
            offset += w;
            range
        })
        .collect()
}

/// Contribution of one coefficient block to the linear predictor, with
/// pointwise standard errors: fit = X_j β_j, se = sqrt(diag(X_j V_j X_j')).
pub(crate) fn block_contribution(
    design: &Array2<f64>,
    coefficients: &Array1<f64>,
    covariance: &Array2<f64>,
    range: &Range<usize>,
) -> (Array1<f64>, Array1<f64>) {
    let xj = design.slice(s![.., range.clone()]);
    let beta_j = coefficients.slice(s![range.clone()]);
    let v_j = covariance.slice(s![range.clone(), range.clone()]);

    let fit = xj.dot(&beta_j);
    let xv = xj.dot(&v_j);
    let se = (&xv * &xj)
        .sum_axis(ndarray::Axis(1))
        .mapv(|v| v.max(0.0).sqrt());
    (fit, se)
}
