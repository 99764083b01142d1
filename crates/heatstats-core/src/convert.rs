// =============================================================================
// ndarray ↔ nalgebra Conversion and Small Linear Algebra Helpers
// =============================================================================
//
// Data lives in ndarray (row-major, easy slicing, what the report crate
// builds design matrices with). Decompositions live in nalgebra (Cholesky,
// LU, symmetric eigen). Everything that crosses that boundary goes through
// this module so the solvers never hand-roll element loops.
//
// =============================================================================

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::{Array1, Array2};

use crate::constants::RANK_TOL;

// =============================================================================
// ndarray → nalgebra
// =============================================================================

/// Convert an ndarray Array2 to a nalgebra DMatrix.
///
/// Works for any memory layout (views from `slice` included).
#[inline]
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Convert an ndarray Array1 to a nalgebra DVector.
#[inline]
pub fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

// =============================================================================
// nalgebra → ndarray
// =============================================================================

/// Convert a nalgebra DMatrix to an ndarray Array2.
#[inline]
pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    let (nrows, ncols) = m.shape();
    Array2::from_shape_fn((nrows, ncols), |(i, j)| m[(i, j)])
}

/// Convert a nalgebra DVector to an ndarray Array1.
#[inline]
pub fn to_array1(v: &DVector<f64>) -> Array1<f64> {
    v.iter().copied().collect()
}

// =============================================================================
// Solves and determinants
// =============================================================================

/// Solve Ax = b and also return A⁻¹, using Cholesky if possible.
///
/// This is the common pattern in WLS solvers where we need both
/// the solution and the inverse for covariance computation.
/// Returns (solution, inverse) or None if singular.
pub fn solve_and_invert(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
    let p = a.nrows();
    if let Some(chol) = a.clone().cholesky() {
        let solution = chol.solve(b);
        let inverse = chol.solve(&DMatrix::identity(p, p));
        return Some((solution, inverse));
    }

    // Fall back to LU for matrices that are only semi-definite numerically
    let lu = a.clone().lu();
    let solution = lu.solve(b)?;
    let inverse = lu.try_inverse()?;
    Some((solution, inverse))
}

/// log|A| for a symmetric positive-definite matrix, via Cholesky.
///
/// Returns None when A is not positive definite.
pub fn log_det_spd(a: &DMatrix<f64>) -> Option<f64> {
    let chol = a.clone().cholesky()?;
    let l = chol.l();
    Some(2.0 * l.diagonal().iter().map(|d| d.ln()).sum::<f64>())
}

/// Numerical rank of a symmetric matrix (count of eigenvalues above
/// `RANK_TOL` × the largest one).
pub fn symmetric_rank(a: &Array2<f64>) -> usize {
    if a.is_empty() {
        return 0;
    }
    let eigen = SymmetricEigen::new(to_dmatrix(a));
    let max_ev = eigen
        .eigenvalues
        .iter()
        .fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    if max_ev <= 0.0 {
        return 0;
    }
    eigen
        .eigenvalues
        .iter()
        .filter(|&&v| v > RANK_TOL * max_ev)
        .count()
}

/// Rank-`r` pseudo-inverse of a symmetric positive semi-definite matrix.
///
/// Keeps the `r` largest eigenvalues and inverts them. Used for Wald tests of
/// smooth terms, where the covariance block is only "EDF-rank" in practice.
pub fn truncated_pinv(a: &Array2<f64>, r: usize) -> Array2<f64> {
    let n = a.nrows();
    let eigen = SymmetricEigen::new(to_dmatrix(a));

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        eigen.eigenvalues[j]
            .partial_cmp(&eigen.eigenvalues[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut pinv = DMatrix::zeros(n, n);
    for &idx in order.iter().take(r.min(n)) {
        let ev = eigen.eigenvalues[idx];
        if ev <= RANK_TOL {
            continue;
        }
        let v = eigen.eigenvectors.column(idx);
        pinv += (v * v.transpose()) / ev;
    }
    to_array2(&pinv)
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
    fn test_matrix_conversion_preserves_layout() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let m = to_dmatrix(&a);
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(to_array2(&m), a);

        // Transposed views are not standard layout but must convert the same way
        let t = a.t().to_owned();
        assert_eq!(to_dmatrix(&t)[(0, 1)], 4.0);
    }

    #[test]
    fn test_solve_and_invert() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_row_slice(&[5.0, 4.0]);
        let (sol, inv) = solve_and_invert(&a, &b).unwrap();
        assert_abs_diff_eq!(4.0 * sol[0] + sol[1], 5.0, epsilon = 1e-10);
        assert_abs_diff_eq!(sol[0] + 3.0 * sol[1], 4.0, epsilon = 1e-10);
        let identity = &a * &inv;
        assert_abs_diff_eq!(identity[(0, 0)], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(identity[(0, 1)], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_log_det_spd() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 8.0]);
        assert_abs_diff_eq!(log_det_spd(&a).unwrap(), 16.0_f64.ln(), epsilon = 1e-12);

        let not_pd = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(log_det_spd(&not_pd).is_none());
    }

    #[test]
    fn test_symmetric_rank() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        assert_eq!(symmetric_rank(&a), 1);
        assert_eq!(symmetric_rank(&Array2::eye(4)), 4);
        assert_eq!(symmetric_rank(&Array2::zeros((3, 3))), 0);
    }

    #[test]
    fn test_truncated_pinv_full_rank_is_inverse() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let pinv = truncated_pinv(&a, 2);
        let prod = a.dot(&pinv);
        assert_abs_diff_eq!(prod[[0, 0]], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(prod[[1, 0]], 0.0, epsilon = 1e-10);
    }
}
