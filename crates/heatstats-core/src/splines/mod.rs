// =============================================================================
// Spline Bases for Smooth Terms
// =============================================================================
//
// A smooth term s(x) is represented as a linear combination of k basis
// functions: s(x) = Σⱼ βⱼ Bⱼ(x). Wiggliness is controlled by a penalty
// λ βᵀSβ rather than by the number of basis functions, so k only needs to be
// "big enough" (55 for the long-term trend, 45 once seasonality is split off).
//
// TWO BASES
// ---------
//   - B-spline (P-spline): cubic B-splines on equally spaced knots spanning
//     the data range, second-order difference penalty.
//   - Cyclic B-spline: the same cardinal cubic pieces wrapped around a
//     period [a, b), so the curve and its derivatives match at a and b.
//     Used for month-of-year, where December must join smoothly to January.
//
// IDENTIFIABILITY
// ---------------
// Both bases sum to one at every x, which duplicates the model intercept.
// We absorb a sum-to-zero constraint Σᵢ s(xᵢ) = 0 by reparameterizing with
// a k × (k-1) matrix Z whose columns are orthogonal to the column sums of
// the basis (a single Householder reflection). The term then uses the basis
// XZ and the penalty ZᵀSZ.
//
// =============================================================================

pub mod penalized;

use ndarray::{Array1, Array2, Axis};

use crate::convert::symmetric_rank;
use crate::error::{Result, StatsError};

pub use penalized::{cyclic_penalty_matrix, gcv_score, penalty_matrix};

/// Smallest basis size that still holds a full cubic piece.
pub const MIN_BASIS_SIZE: usize = 4;

/// Which kind of spline a smooth term is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BasisKind {
    /// Cubic B-spline over `boundary`, second-order difference penalty.
    BSpline { boundary: (f64, f64) },
    /// Cyclic cubic B-spline with period `[start, end)`.
    Cyclic { period: (f64, f64) },
}

impl BasisKind {
    /// Short label used in model summaries (mgcv-style "ps"/"cp").
    pub fn label(&self) -> &'static str {
        match self {
            BasisKind::BSpline { .. } => "ps",
            BasisKind::Cyclic { .. } => "cp",
        }
    }
}

// =============================================================================
// Cardinal B-splines
// =============================================================================

/// Cardinal B-spline of the given degree, supported on [0, degree + 1).
///
/// Evaluated with the uniform-knot Cox–de Boor recursion:
///     N₀(u) = 1 on [0, 1)
///     N_d(u) = [u N_{d-1}(u) + (d + 1 - u) N_{d-1}(u - 1)] / d
fn cardinal_bspline(u: f64, degree: usize) -> f64 {
    if degree == 0 {
        return if (0.0..1.0).contains(&u) { 1.0 } else { 0.0 };
    }
    if u <= 0.0 || u >= (degree + 1) as f64 {
        return 0.0;
    }
    let d = degree as f64;
    (u * cardinal_bspline(u, degree - 1) + (d + 1.0 - u) * cardinal_bspline(u - 1.0, degree - 1))
        / d
}

/// B-spline basis matrix (n × k) on equally spaced knots.
///
/// The interval `boundary` (defaults to the data range) is split into
/// `k - degree` segments and the knot sequence is extended by `degree`
/// knots on each side, so every x in the interval (endpoints included)
/// has exactly `degree + 1` non-zero basis functions that sum to one.
pub fn bs_basis(
    x: &Array1<f64>,
    k: usize,
    degree: usize,
    boundary: Option<(f64, f64)>,
) -> Array2<f64> {
    let (lo, hi) = boundary.unwrap_or_else(|| data_range(x));
    let segments = k.saturating_sub(degree).max(1);
    let h = if hi > lo { (hi - lo) / segments as f64 } else { 1.0 };

    let mut basis = Array2::zeros((x.len(), k));
    for (i, &xi) in x.iter().enumerate() {
        for j in 0..k {
            // Knot t_j = lo + (j - degree) h; B_j(x) = N((x - t_j) / h)
            let u = (xi - lo) / h - (j as f64 - degree as f64);
            basis[[i, j]] = cardinal_bspline(u, degree);
        }
    }
    basis
}

/// Cyclic cubic B-spline basis matrix (n × k) with period `[start, end)`.
///
/// k equally spaced knots cover one period; each cubic piece is wrapped, so
/// `B(start) == B(end)` row for row.
pub fn cyclic_basis(x: &Array1<f64>, k: usize, period: (f64, f64)) -> Array2<f64> {
    let (start, end) = period;
    let h = (end - start) / k as f64;
    let kf = k as f64;

    let mut basis = Array2::zeros((x.len(), k));
    for (i, &xi) in x.iter().enumerate() {
        for j in 0..k {
            let u = ((xi - start) / h - j as f64).rem_euclid(kf);
            basis[[i, j]] = cardinal_bspline(u, 3);
        }
    }
    basis
}

fn data_range(x: &Array1<f64>) -> (f64, f64) {
    let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lo, hi)
}

// =============================================================================
// Identifiability constraint
// =============================================================================

/// Null-space basis Z (k × (k-1)) of the constraint 1ᵀX β = 0.
///
/// Uses one Householder reflection H = I - 2vvᵀ/(vᵀv) with
/// v = c + sign(c₀)‖c‖e₁, where c holds the column sums of X.
/// The first column of H is parallel to c, so the remaining columns are an
/// orthonormal basis of its orthogonal complement.
pub fn sum_to_zero_constraint(basis: &Array2<f64>) -> Array2<f64> {
    let k = basis.ncols();
    let mut v: Array1<f64> = basis.sum_axis(Axis(0));
    let norm = v.dot(&v).sqrt();

    let mut h = Array2::<f64>::eye(k);
    if norm > 0.0 {
        v[0] += if v[0] >= 0.0 { norm } else { -norm };
        let vtv = v.dot(&v);
        for r in 0..k {
            for c in 0..k {
                h[[r, c]] -= 2.0 * v[r] * v[c] / vtv;
            }
        }
    }
    h.slice(ndarray::s![.., 1..]).to_owned()
}

// =============================================================================
// SmoothBasis
// =============================================================================

/// A constrained smooth term ready to be appended to a design matrix.
#[derive(Debug, Clone)]
pub struct SmoothBasis {
    /// Covariate name (e.g. "time", "months").
    pub name: String,
    /// Kind and its range/period.
    pub kind: BasisKind,
    /// Basis size before the constraint is absorbed.
    pub k: usize,
    /// Constrained basis XZ (n × (k-1)).
    pub basis: Array2<f64>,
    /// Constrained penalty ZᵀSZ ((k-1) × (k-1)).
    pub penalty: Array2<f64>,
    /// Constraint reparameterization Z (k × (k-1)).
    pub constraint: Array2<f64>,
    /// Rank of the constrained penalty.
    pub penalty_rank: usize,
}

impl SmoothBasis {
    /// Cubic P-spline with `k` basis functions over the range of `x`.
    pub fn bspline(name: &str, x: &Array1<f64>, k: usize) -> Result<Self> {
        validate_covariate(name, x, k)?;
        let boundary = data_range(x);
        if boundary.1 <= boundary.0 {
            return Err(StatsError::InvalidValue(format!(
                "smooth term '{}' needs at least two distinct covariate values",
                name
            )));
        }
        let raw = bs_basis(x, k, 3, Some(boundary));
        let penalty = penalty_matrix(k, 2);
        Ok(Self::constrain(name, BasisKind::BSpline { boundary }, k, raw, penalty))
    }

    /// Cyclic cubic spline with `k` basis functions and period `[start, end)`.
    pub fn cyclic(name: &str, x: &Array1<f64>, k: usize, period: (f64, f64)) -> Result<Self> {
        validate_covariate(name, x, k)?;
        if period.1 <= period.0 {
            return Err(StatsError::InvalidValue(format!(
                "cyclic term '{}' has an empty period [{}, {})",
                name, period.0, period.1
            )));
        }
        let raw = cyclic_basis(x, k, period);
        let penalty = cyclic_penalty_matrix(k);
        Ok(Self::constrain(name, BasisKind::Cyclic { period }, k, raw, penalty))
    }

    fn constrain(name: &str, kind: BasisKind, k: usize, raw: Array2<f64>, penalty: Array2<f64>) -> Self {
        let z = sum_to_zero_constraint(&raw);
        let basis = raw.dot(&z);
        let penalty = z.t().dot(&penalty).dot(&z);
        let penalty_rank = symmetric_rank(&penalty);
        Self {
            name: name.to_string(),
            kind,
            k,
            basis,
            penalty,
            constraint: z,
            penalty_rank,
        }
    }

    /// Number of columns the term contributes to the design matrix.
    pub fn ncols(&self) -> usize {
        self.basis.ncols()
    }
}

fn validate_covariate(name: &str, x: &Array1<f64>, k: usize) -> Result<()> {
    if x.is_empty() {
        return Err(StatsError::EmptyInput(format!("covariate '{}' is empty", name)));
    }
    if k < MIN_BASIS_SIZE {
        return Err(StatsError::InvalidValue(format!(
            "smooth term '{}' needs at least {} basis functions, got {}",
            name, MIN_BASIS_SIZE, k
        )));
    }
    if let Some(bad) = x.iter().find(|v| !v.is_finite()) {
        return Err(StatsError::InvalidValue(format!(
            "covariate '{}' contains non-finite value {}",
            name, bad
        )));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid(n: usize, lo: f64, hi: f64) -> Array1<f64> {
        Array1::linspace(lo, hi, n)
    }

    #[test]
    fn test_cardinal_cubic_values_at_knots() {
        assert_abs_diff_eq!(cardinal_bspline(1.0, 3), 1.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cardinal_bspline(2.0, 3), 4.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cardinal_bspline(3.0, 3), 1.0 / 6.0, epsilon = 1e-12);
        assert_eq!(cardinal_bspline(4.0, 3), 0.0);
        assert_eq!(cardinal_bspline(-0.5, 3), 0.0);
    }

    #[test]
    fn test_bs_basis_partition_of_unity() {
        let x = grid(50, 1.0, 240.0);
        let basis = bs_basis(&x, 12, 3, None);
        assert_eq!(basis.shape(), &[50, 12]);
        for row in basis.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_cyclic_basis_is_periodic() {
        let x = Array1::from(vec![0.5, 12.5, 3.0, 15.0]);
        let basis = cyclic_basis(&x, 8, (0.5, 12.5));
        for j in 0..8 {
            assert_abs_diff_eq!(basis[[0, j]], basis[[1, j]], epsilon = 1e-12);
            assert_abs_diff_eq!(basis[[2, j]], basis[[3, j]], epsilon = 1e-12);
        }
        for row in basis.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_constrained_columns_sum_to_zero() {
        let x = grid(120, 1.0, 120.0);
        let smooth = SmoothBasis::bspline("time", &x, 10).unwrap();
        assert_eq!(smooth.ncols(), 9);
        for col in smooth.basis.columns() {
            assert_abs_diff_eq!(col.sum(), 0.0, epsilon = 1e-8);
        }
        // Z has orthonormal columns
        let ztz = smooth.constraint.t().dot(&smooth.constraint);
        for i in 0..9 {
            for j in 0..9 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(ztz[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_penalty_ranks() {
        let months: Array1<f64> = (0..48).map(|i| (i % 12 + 1) as f64).collect();
        let cyclic = SmoothBasis::cyclic("months", &months, 12, (0.5, 12.5)).unwrap();
        // Cyclic difference penalty only leaves constants unpenalized,
        // and the constraint removes the constant.
        assert_eq!(cyclic.penalty_rank, 11);

        let time = grid(48, 1.0, 48.0);
        let trend = SmoothBasis::bspline("time", &time, 12).unwrap();
        // Linear trend stays unpenalized.
        assert_eq!(trend.penalty_rank, 10);
    }

    #[test]
    fn test_rejects_tiny_basis() {
        let x = grid(10, 0.0, 1.0);
        assert!(SmoothBasis::bspline("x", &x, 3).is_err());
        let constant = Array1::from_elem(10, 2.0);
        assert!(SmoothBasis::bspline("x", &constant, 6).is_err());
    }
}
