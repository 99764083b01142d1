// =============================================================================
// Additive Models with AR(1) Errors
// =============================================================================
//
// Monthly heat-content anomalies are serially correlated: this month's
// residual says a lot about next month's. Treating them as independent makes
// every smooth look more certain than it is. Here the errors follow
//
//     eₜ = ρ eₜ₋₁ + εₜ,   εₜ ~ N(0, σ²(1 - ρ²))   (so Var(eₜ) = σ²)
//
// PRAIS-WINSTEN WHITENING
// -----------------------
// For a known ρ, the transform
//
//     ẽ₁ = e₁,   ẽₜ = (eₜ - ρ eₜ₋₁) / √(1 - ρ²)
//
// turns correlated errors into independent N(0, σ²) ones. Applying it to
// both y and every column of X gives an ordinary penalized regression.
//
// ESTIMATION
// ----------
// For fixed ρ, the smoothing parameters maximize the restricted likelihood.
// With σ² profiled out, minus twice the REML criterion is (up to constants)
//
//     (n - Mp) log σ̂² + log|X̃'X̃ + Sλ| - Σⱼ rⱼ log λⱼ + (n - 1) log(1 - ρ²)
//
// where Mp is the dimension of the penalty null space, rⱼ the rank of Sⱼ and
// σ̂² = (ỹ'ỹ - β̂'X̃'ỹ) / (n - Mp). The last term is log|R| for the AR(1)
// correlation matrix R. ρ itself is then found by Brent's method on the
// profiled criterion.
//
// =============================================================================

use nalgebra::DVector;
use ndarray::{Array1, Array2, Axis};
use std::ops::Range;
use tracing::debug;

use crate::convert::{log_det_spd, to_array1, to_array2};
use crate::error::{Result, StatsError};

use super::gcv_optimizer::{brent_minimize, minimize_log_lambdas, MultiTermGCVOptimizer};
use super::smooth_glm::SmoothTermData;
use super::{block_contribution, block_ranges};

/// Configuration for the AR(1) additive model.
#[derive(Debug, Clone)]
pub struct Ar1Config {
    /// Search interval for ρ
    pub rho_bounds: (f64, f64),
    /// Brent tolerance on ρ
    pub rho_tol: f64,
    /// Maximum Brent iterations on ρ
    pub max_rho_iter: usize,
    /// Smallest λ searched
    pub lambda_min: f64,
    /// Largest λ searched
    pub lambda_max: f64,
    /// Brent tolerance on log λ
    pub lambda_tol: f64,
    /// Maximum coordinate-descent sweeps over the λs
    pub max_lambda_iter: usize,
}

impl Default for Ar1Config {
    fn default() -> Self {
        Self {
            rho_bounds: (-0.99, 0.99),
            rho_tol: 1e-5,
            max_rho_iter: 100,
            lambda_min: 1e-6,
            lambda_max: 1e8,
            lambda_tol: 1e-4,
            max_lambda_iter: 10,
        }
    }
}

/// Result of an AR(1) additive model fit.
#[derive(Debug, Clone)]
pub struct Ar1SmoothResult {
    /// Estimated AR(1) coefficient
    pub rho: f64,
    /// Estimated innovation-scale variance σ²
    pub sigma2: f64,
    /// Coefficients (parametric + smooth basis)
    pub coefficients: Array1<f64>,
    /// Covariance σ² (X̃'X̃ + Sλ)⁻¹
    pub covariance: Array2<f64>,
    /// Fitted values Xβ on the original scale
    pub fitted_values: Array1<f64>,
    /// Raw residuals y - Xβ
    pub residuals: Array1<f64>,
    /// Whitened residuals divided by σ̂; approximately iid N(0, 1)
    pub normalized_residuals: Array1<f64>,
    /// Selected smoothing parameters
    pub lambdas: Vec<f64>,
    /// EDF of each smooth term
    pub smooth_edfs: Vec<f64>,
    /// Total EDF
    pub total_edf: f64,
    /// Minimized -2 × restricted log-likelihood (up to a constant)
    pub reml: f64,
    /// Brent iterations on ρ
    pub iterations: usize,
    /// Did the search on ρ converge?
    pub converged: bool,
    /// Unwhitened design [parametric | smooth1 | ...]
    pub design: Array2<f64>,
    /// Number of parametric columns
    pub n_parametric: usize,
    /// Column block of each smooth term
    pub term_ranges: Vec<Range<usize>>,
}

impl Ar1SmoothResult {
    pub fn std_errors(&self) -> Array1<f64> {
        self.covariance.diag().mapv(|v| v.max(0.0).sqrt())
    }

    pub fn residual_df(&self) -> f64 {
        self.fitted_values.len() as f64 - self.total_edf
    }

    /// Coefficients and covariance block of one smooth term.
    pub fn term_block(&self, term: usize) -> (Array1<f64>, Array2<f64>) {
        let range = self.term_ranges[term].clone();
        (
            self.coefficients.slice(ndarray::s![range.clone()]).to_owned(),
            self.covariance
                .slice(ndarray::s![range.clone(), range])
                .to_owned(),
        )
    }

    /// Partial effect of one smooth term with pointwise standard errors.
    pub fn term_contribution(&self, term: usize) -> (Array1<f64>, Array1<f64>) {
        block_contribution(
            &self.design,
            &self.coefficients,
            &self.covariance,
            &self.term_ranges[term],
        )
    }
}

// =============================================================================
// Whitening
// =============================================================================

/// Prais-Winsten transform of a series for AR(1) coefficient ρ.
pub fn whiten(v: &Array1<f64>, rho: f64) -> Array1<f64> {
    let scale = (1.0 - rho * rho).sqrt();
    let mut out = v.clone();
    for t in 1..v.len() {
        out[t] = (v[t] - rho * v[t - 1]) / scale;
    }
    out
}

/// Prais-Winsten transform applied to every column.
pub fn whiten_columns(x: &Array2<f64>, rho: f64) -> Array2<f64> {
    let mut out = x.clone();
    for (mut dst, src) in out.axis_iter_mut(Axis(1)).zip(x.axis_iter(Axis(1))) {
        dst.assign(&whiten(&src.to_owned(), rho));
    }
    out
}

// =============================================================================
// REML for fixed ρ
// =============================================================================

/// Whitened cross-products plus everything the REML criterion needs.
struct RemlProblem {
    cross: MultiTermGCVOptimizer,
    ranks: Vec<usize>,
    /// n - Mp
    df_reml: f64,
    /// (n - 1) log(1 - ρ²)
    log_det_corr: f64,
}

impl RemlProblem {
    fn new(
        x: &Array2<f64>,
        y: &Array1<f64>,
        penalties: &[Array2<f64>],
        ranks: &[usize],
        term_ranges: &[Range<usize>],
        rho: f64,
    ) -> Self {
        let n = y.len();
        let p = x.ncols();
        let xw = whiten_columns(x, rho);
        let yw = whiten(y, rho);
        let cross = MultiTermGCVOptimizer::new(&xw, &yw, &Array1::ones(n), penalties, term_ranges.to_vec());
        let null_dim = p.saturating_sub(ranks.iter().sum());
        Self {
            cross,
            ranks: ranks.to_vec(),
            df_reml: n as f64 - null_dim as f64,
            log_det_corr: (n as f64 - 1.0) * (1.0 - rho * rho).ln(),
        }
    }

    /// β̂ and σ̂² at the given λ, or None when the system is not PD.
    fn solve(&self, lambdas: &[f64]) -> Option<(DVector<f64>, f64, f64)> {
        let a = self.cross.penalized(lambdas);
        let log_det = log_det_spd(&a)?;
        let beta = a.cholesky()?.solve(&self.cross.xtwz);
        let rss_pen = self.cross.ztwz - beta.dot(&self.cross.xtwz);
        let sigma2 = rss_pen / self.df_reml;
        Some((beta, sigma2, log_det))
    }

    fn criterion(&self, lambdas: &[f64]) -> f64 {
        if self.df_reml <= 0.0 {
            return f64::INFINITY;
        }
        let (_, sigma2, log_det) = match self.solve(lambdas) {
            Some(s) => s,
            None => return f64::INFINITY,
        };
        if sigma2.is_nan() || sigma2 <= 0.0 {
            return f64::INFINITY;
        }
        let log_s: f64 = self
            .ranks
            .iter()
            .zip(lambdas)
            .map(|(&r, &l)| r as f64 * l.ln())
            .sum();
        self.df_reml * sigma2.ln() + log_det - log_s + self.log_det_corr
    }
}

// =============================================================================
// Fitting
// =============================================================================

/// Fit y = Xβ + Σ sⱼ(xⱼ) + e with AR(1) errors e (rows must be in time order).
pub fn fit_ar1_smooth(
    y: &Array1<f64>,
    x_parametric: &Array2<f64>,
    smooth_terms: &[SmoothTermData],
    config: &Ar1Config,
) -> Result<Ar1SmoothResult> {
    let n = y.len();
    let p_param = x_parametric.ncols();

    if n < 3 {
        return Err(StatsError::EmptyInput(format!(
            "AR(1) model needs at least 3 observations, got {}",
            n
        )));
    }
    if x_parametric.nrows() != n {
        return Err(StatsError::DimensionMismatch(format!(
            "x_parametric has {} rows but y has {} elements",
            x_parametric.nrows(),
            n
        )));
    }
    if let Some(term) = smooth_terms.iter().find(|t| t.basis.nrows() != n) {
        return Err(StatsError::DimensionMismatch(format!(
            "smooth term '{}' has {} rows but y has {} elements",
            term.name,
            term.basis.nrows(),
            n
        )));
    }
    if let Some(bad) = y.iter().find(|v| !v.is_finite()) {
        return Err(StatsError::InvalidValue(format!(
            "response contains non-finite value {}",
            bad
        )));
    }
    let (rho_lo, rho_hi) = config.rho_bounds;
    if !(-1.0 < rho_lo && rho_lo < rho_hi && rho_hi < 1.0) {
        return Err(StatsError::InvalidValue(format!(
            "rho bounds ({}, {}) must lie strictly inside (-1, 1)",
            rho_lo, rho_hi
        )));
    }

    let term_ranges = block_ranges(p_param, smooth_terms.iter().map(SmoothTermData::k));
    let total_cols = term_ranges.last().map_or(p_param, |r| r.end);
    let mut design = Array2::zeros((n, total_cols));
    design
        .slice_mut(ndarray::s![.., 0..p_param])
        .assign(x_parametric);
    for (term, range) in smooth_terms.iter().zip(&term_ranges) {
        design
            .slice_mut(ndarray::s![.., range.clone()])
            .assign(&term.basis);
    }

    let penalties: Vec<Array2<f64>> = smooth_terms.iter().map(|t| t.penalty.clone()).collect();
    let ranks: Vec<usize> = smooth_terms.iter().map(|t| t.penalty_rank).collect();
    let initial: Vec<f64> = smooth_terms.iter().map(|t| t.initial_lambda).collect();

    // Profile out λ for a given ρ
    let profile = |rho: f64| -> (f64, Vec<f64>, RemlProblem) {
        let problem = RemlProblem::new(&design, y, &penalties, &ranks, &term_ranges, rho);
        let lambdas = minimize_log_lambdas(
            |l| problem.criterion(l),
            &initial,
            config.lambda_min.ln(),
            config.lambda_max.ln(),
            config.lambda_tol,
            config.max_lambda_iter,
        );
        (problem.criterion(&lambdas), lambdas, problem)
    };

    let search = brent_minimize(
        |rho| profile(rho).0,
        rho_lo,
        rho_hi,
        config.rho_tol,
        config.max_rho_iter,
    );
    let rho = search.x_min;
    debug!(rho, reml = search.f_min, iterations = search.iterations, "AR(1) search finished");

    if !search.converged {
        return Err(StatsError::ConvergenceFailure(format!(
            "AR(1) coefficient search did not converge in {} iterations",
            config.max_rho_iter
        )));
    }
    if !search.f_min.is_finite() {
        return Err(StatsError::ConvergenceFailure(
            "restricted likelihood is not finite at the selected AR(1) coefficient".to_string(),
        ));
    }
    let edge = 1e-3 * (rho_hi - rho_lo);
    if rho - rho_lo < edge || rho_hi - rho < edge {
        return Err(StatsError::ConvergenceFailure(format!(
            "AR(1) coefficient {:.4} is at the edge of the search interval ({}, {})",
            rho, rho_lo, rho_hi
        )));
    }

    // Final fit at the selected (ρ, λ)
    let (reml, lambdas, problem) = profile(rho);
    let (beta, sigma2, _) = problem.solve(&lambdas).ok_or_else(|| {
        StatsError::LinearAlgebraError("penalized normal equations are not positive definite".to_string())
    })?;
    let inverse = problem
        .cross
        .penalized(&lambdas)
        .try_inverse()
        .ok_or_else(|| StatsError::LinearAlgebraError("cannot invert penalized normal equations".to_string()))?;

    let coefficients = to_array1(&beta);
    let covariance = to_array2(&inverse) * sigma2;
    let (smooth_edfs, total_edf) = problem.cross.compute_edfs(&lambdas);

    let fitted_values = design.dot(&coefficients);
    let residuals = y - &fitted_values;
    let sigma = sigma2.sqrt();
    let normalized_residuals = whiten(&residuals, rho).mapv(|r| r / sigma);

    debug!(rho, sigma2, ?lambdas, ?smooth_edfs, "AR(1) additive model fitted");

    Ok(Ar1SmoothResult {
        rho,
        sigma2,
        coefficients,
        covariance,
        fitted_values,
        residuals,
        normalized_residuals,
        lambdas,
        smooth_edfs,
        total_edf,
        reml,
        iterations: search.iterations,
        converged: search.converged,
        design,
        n_parametric: p_param,
        term_ranges,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splines::SmoothBasis;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    /// Deterministic standard normals (LCG + Box-Muller).
    fn normals(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut uniform = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 11) as f64 + 0.5) / (1u64 << 53) as f64
        };
        (0..n)
            .map(|_| {
                let u1 = uniform();
                let u2 = uniform();
                (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    fn ar1_series(n: usize, rho: f64) -> (Array1<f64>, Array1<f64>) {
        let eps = normals(n, 42);
        let mut e = vec![0.0; n];
        e[0] = eps[0];
        for t in 1..n {
            e[t] = rho * e[t - 1] + (1.0 - rho * rho).sqrt() * eps[t];
        }
        let time: Array1<f64> = (1..=n).map(|t| t as f64).collect();
        let y: Array1<f64> = time
            .iter()
            .zip(&e)
            .map(|(&t, &et)| 5.0 + 3.0 * (t / n as f64 * 3.0).sin() + 0.5 * et)
            .collect();
        (time, y)
    }

    #[test]
    fn test_whiten_known_values() {
        let v = array![1.0, 2.0, 3.0];
        let w = whiten(&v, 0.5);
        let s = 0.75_f64.sqrt();
        assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w[1], 1.5 / s, epsilon = 1e-12);
        assert_abs_diff_eq!(w[2], 2.0 / s, epsilon = 1e-12);

        assert_eq!(whiten(&v, 0.0), v);
    }

    #[test]
    fn test_whiten_columns_matches_whiten() {
        let x = array![[1.0, 4.0], [2.0, 5.0], [3.0, 7.0]];
        let w = whiten_columns(&x, 0.3);
        let col = whiten(&array![4.0, 5.0, 7.0], 0.3);
        for i in 0..3 {
            assert_abs_diff_eq!(w[[i, 1]], col[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_recovers_positive_autocorrelation() {
        let n = 300;
        let (time, y) = ar1_series(n, 0.6);
        let smooth = SmoothBasis::bspline("time", &time, 15).unwrap();
        let terms = vec![SmoothTermData::from(&smooth)];

        let result = fit_ar1_smooth(&y, &Array2::ones((n, 1)), &terms, &Ar1Config::default()).unwrap();

        assert!(result.converged);
        assert!(result.rho > 0.35 && result.rho < 0.8, "rho = {}", result.rho);
        assert!(result.sigma2 > 0.0);
        assert_eq!(result.normalized_residuals.len(), n);
        assert_abs_diff_eq!(
            (&result.fitted_values + &result.residuals - &y).mapv(f64::abs).sum(),
            0.0,
            epsilon = 1e-8
        );

        // Normalized residuals should have roughly unit variance
        let var = result.normalized_residuals.mapv(|r| r * r).mean().unwrap();
        assert!(var > 0.6 && var < 1.4, "variance {}", var);

        let (fit, se) = result.term_contribution(0);
        assert_eq!(fit.len(), n);
        assert!(se.iter().all(|&s| s > 0.0));
    }

    #[test]
    fn test_boundary_rho_is_a_convergence_failure() {
        let n = 200;
        let (time, y) = ar1_series(n, 0.8);
        let smooth = SmoothBasis::bspline("time", &time, 10).unwrap();
        let terms = vec![SmoothTermData::from(&smooth)];
        let config = Ar1Config {
            rho_bounds: (-0.1, 0.1),
            ..Default::default()
        };

        let err = fit_ar1_smooth(&y, &Array2::ones((n, 1)), &terms, &config).unwrap_err();
        assert!(matches!(err, StatsError::ConvergenceFailure(_)));
    }

    #[test]
    fn test_rejects_short_series() {
        let y = array![1.0, 2.0];
        let err = fit_ar1_smooth(&y, &Array2::ones((2, 1)), &[], &Ar1Config::default()).unwrap_err();
        assert!(matches!(err, StatsError::EmptyInput(_)));
    }
}
