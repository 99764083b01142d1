// =============================================================================
// GCV OPTIMIZER: Lambda Selection via Brent's Method
// =============================================================================
//
// Instead of refitting the model for each λ, we optimize λ using cached
// cross-products from the current IRLS weights.
//
// THE KEY INSIGHT
// ---------------
// Once we have X'WX, X'Wz and z'Wz, everything GCV needs is cheap:
//   β(λ)   = (X'WX + Σ λⱼSⱼ)⁻¹ X'Wz
//   RSS(λ) = z'Wz - 2β'X'Wz + β'X'WXβ
//   EDF(λ) = trace((X'WX + Σ λⱼSⱼ)⁻¹ X'WX)
//   GCV(λ) = n × RSS(λ) / (n - EDF(λ))²
//
// With several smooth terms we cycle through them, minimizing over one
// log λⱼ at a time with Brent's method while the others stay fixed.
//
// =============================================================================

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use std::ops::Range;

use crate::convert::{to_dmatrix, to_dvector};
use crate::splines::gcv_score;

/// Result from Brent's optimization
#[derive(Debug, Clone)]
pub struct BrentResult {
    pub x_min: f64,
    pub f_min: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Brent's method for 1D minimization.
///
/// Finds the minimum of f(x) in the interval [a, b]: golden-section steps
/// with parabolic interpolation whenever the parabola is trustworthy.
///
/// # Arguments
/// * `f` - Function to minimize
/// * `a` - Lower bound of search interval
/// * `b` - Upper bound of search interval
/// * `tol` - Convergence tolerance
/// * `max_iter` - Maximum iterations
pub fn brent_minimize<F>(f: F, a: f64, b: f64, tol: f64, max_iter: usize) -> BrentResult
where
    F: Fn(f64) -> f64,
{
    let golden = 0.381966011250105; // (3 - sqrt(5)) / 2

    let mut a = a;
    let mut b = b;
    let mut x = a + golden * (b - a);
    let mut w = x;
    let mut v = x;
    let mut fx = f(x);
    let mut fw = fx;
    let mut fv = fx;

    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for iter in 0..max_iter {
        let mid = 0.5 * (a + b);
        let tol1 = tol * x.abs() + 1e-10;
        let tol2 = 2.0 * tol1;

        if (x - mid).abs() <= tol2 - 0.5 * (b - a) {
            return BrentResult {
                x_min: x,
                f_min: fx,
                iterations: iter + 1,
                converged: true,
            };
        }

        // Try parabolic interpolation through x, w, v
        let mut use_golden = true;

        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let q = (x - v) * (fx - fw);
            let p = (x - v) * q - (x - w) * r;
            let q = 2.0 * (q - r);

            let (p, q) = if q > 0.0 { (-p, q) } else { (p, -q) };

            let e_old = e;
            e = d;

            if p.abs() < (0.5 * q * e_old).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                // Don't evaluate too close to endpoints
                if u - a < tol2 || b - u < tol2 {
                    d = if x < mid { tol1 } else { -tol1 };
                }
                use_golden = false;
            }
        }

        if use_golden {
            e = if x < mid { b - x } else { a - x };
            d = golden * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0.0 {
            x + tol1
        } else {
            x - tol1
        };

        let fu = f(u);

        // Update bracketing interval
        if fu <= fx {
            if u < x {
                b = x;
            } else {
                a = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    BrentResult {
        x_min: x,
        f_min: fx,
        iterations: max_iter,
        converged: false,
    }
}

// =============================================================================
// Multi-term GCV optimizer
// =============================================================================

/// Cached cross-products of one weighted least-squares problem with
/// block-diagonal smoothing penalties.
///
/// Built once per IRLS iteration (or once per ρ for whitened AR(1) models)
/// and reused for every λ evaluation.
#[derive(Debug, Clone)]
pub struct MultiTermGCVOptimizer {
    /// X'WX (p × p)
    pub xtwx: DMatrix<f64>,
    /// X'Wz (p)
    pub xtwz: DVector<f64>,
    /// z'Wz
    pub ztwz: f64,
    /// One penalty per smooth term, sized to its column block
    pub penalties: Vec<DMatrix<f64>>,
    /// Column block of each smooth term
    pub col_ranges: Vec<Range<usize>>,
    /// Number of observations
    pub n: usize,
}

impl MultiTermGCVOptimizer {
    /// Create the optimizer from a design, working response and weights.
    pub fn new(
        x: &Array2<f64>,
        z: &Array1<f64>,
        w: &Array1<f64>,
        penalties: &[Array2<f64>],
        col_ranges: Vec<Range<usize>>,
    ) -> Self {
        let xw = x * &w.view().insert_axis(ndarray::Axis(1));
        let xtwx = x.t().dot(&xw);
        let xtwz = xw.t().dot(z);
        let ztwz = z.iter().zip(w.iter()).map(|(&zi, &wi)| wi * zi * zi).sum();

        Self {
            xtwx: to_dmatrix(&xtwx),
            xtwz: to_dvector(&xtwz),
            ztwz,
            penalties: penalties.iter().map(to_dmatrix).collect(),
            col_ranges,
            n: x.nrows(),
        }
    }

    /// X'WX + Σ λⱼSⱼ
    pub fn penalized(&self, lambdas: &[f64]) -> DMatrix<f64> {
        let mut xtwx_pen = self.xtwx.clone();
        for ((range, penalty), &lambda) in self.col_ranges.iter().zip(&self.penalties).zip(lambdas) {
            let k = range.len();
            let mut block = xtwx_pen.view_mut((range.start, range.start), (k, k));
            block += penalty * lambda;
        }
        xtwx_pen
    }

    /// Weighted residual sum of squares for coefficients β.
    pub fn rss(&self, beta: &DVector<f64>) -> f64 {
        let fit = beta.dot(&(&self.xtwx * beta));
        (self.ztwz - 2.0 * beta.dot(&self.xtwz) + fit).max(0.0)
    }

    /// Coefficients at the given smoothing parameters.
    pub fn solve(&self, lambdas: &[f64]) -> Option<DVector<f64>> {
        self.penalized(lambdas)
            .cholesky()
            .map(|chol| chol.solve(&self.xtwz))
    }

    /// Per-term EDFs and the total EDF (trace of the full hat matrix).
    pub fn compute_edfs(&self, lambdas: &[f64]) -> (Vec<f64>, f64) {
        let p = self.xtwx.nrows();
        let chol = match self.penalized(lambdas).cholesky() {
            Some(c) => c,
            None => {
                let widths = self.col_ranges.iter().map(|r| r.len() as f64).collect();
                return (widths, p as f64);
            }
        };
        let hat = chol.solve(&self.xtwx);
        let per_term = self
            .col_ranges
            .iter()
            .map(|r| r.clone().map(|i| hat[(i, i)]).sum::<f64>())
            .collect();
        (per_term, hat.trace())
    }

    /// GCV at the given smoothing parameters.
    pub fn evaluate_gcv(&self, lambdas: &[f64]) -> f64 {
        let chol = match self.penalized(lambdas).cholesky() {
            Some(c) => c,
            None => return f64::INFINITY,
        };
        let beta = chol.solve(&self.xtwz);
        let rss = self.rss(&beta);
        let total_edf = chol.solve(&self.xtwx).trace();
        gcv_score(rss, self.n, total_edf)
    }

    /// Optimize all lambdas by coordinate descent on log λ.
    pub fn optimize_lambdas(
        &self,
        initial: &[f64],
        log_lambda_min: f64,
        log_lambda_max: f64,
        tol: f64,
        max_outer_iter: usize,
    ) -> Vec<f64> {
        minimize_log_lambdas(
            |lambdas| self.evaluate_gcv(lambdas),
            initial,
            log_lambda_min,
            log_lambda_max,
            tol,
            max_outer_iter,
        )
    }
}

/// Coordinate descent over log λ with Brent's method per coordinate.
///
/// Stops once no λ moves by more than 1% relative to its previous value.
pub(crate) fn minimize_log_lambdas<F>(
    criterion: F,
    initial: &[f64],
    log_lambda_min: f64,
    log_lambda_max: f64,
    tol: f64,
    max_outer_iter: usize,
) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut lambdas = initial.to_vec();

    for _ in 0..max_outer_iter {
        let old_lambdas = lambdas.clone();

        for term_idx in 0..lambdas.len() {
            let result = brent_minimize(
                |log_lam| {
                    let mut test_lambdas = lambdas.clone();
                    test_lambdas[term_idx] = log_lam.exp();
                    criterion(&test_lambdas)
                },
                log_lambda_min,
                log_lambda_max,
                tol,
                30,
            );
            lambdas[term_idx] = result.x_min.exp();
        }

        let max_change: f64 = lambdas
            .iter()
            .zip(&old_lambdas)
            .map(|(&new, &old)| ((new - old) / old.max(1e-10)).abs())
            .fold(0.0, f64::max);

        if max_change < 0.01 {
            break;
        }
    }

    lambdas
}
