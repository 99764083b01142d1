// =============================================================================
// Difference Penalties and Smoothness Criteria
// =============================================================================
//
// P-splines penalize differences between neighbouring coefficients:
//
//     penalty = λ Σ (Δ²βⱼ)² = λ βᵀ DᵀD β
//
// Second differences vanish for linear coefficient sequences, so the
// unpenalized limit (λ → ∞) of a trend term is a straight line. The cyclic
// version wraps the differences around, leaving only constants unpenalized.
//
// =============================================================================

use ndarray::Array2;

/// Difference matrix D of the given order ((k - order) × k).
fn difference_matrix(k: usize, order: usize) -> Array2<f64> {
    let mut d = Array2::<f64>::eye(k);
    for _ in 0..order {
        let rows = d.nrows();
        if rows < 2 {
            return Array2::zeros((0, k));
        }
        let mut next = Array2::zeros((rows - 1, k));
        for r in 0..rows - 1 {
            for c in 0..k {
                next[[r, c]] = d[[r + 1, c]] - d[[r, c]];
            }
        }
        d = next;
    }
    d
}

/// Penalty S = DᵀD for an `order`-th difference penalty on k coefficients.
pub fn penalty_matrix(k: usize, order: usize) -> Array2<f64> {
    let d = difference_matrix(k, order);
    d.t().dot(&d)
}

/// Cyclic second-difference penalty: row i of D is
/// β_{i-1} - 2β_i + β_{i+1} with indices taken mod k.
pub fn cyclic_penalty_matrix(k: usize) -> Array2<f64> {
    let mut d = Array2::zeros((k, k));
    for i in 0..k {
        d[[i, (i + k - 1) % k]] += 1.0;
        d[[i, i]] -= 2.0;
        d[[i, (i + 1) % k]] += 1.0;
    }
    d.t().dot(&d)
}

/// GCV score: n × Deviance / (n - EDF)².
pub fn gcv_score(deviance: f64, n: usize, edf: f64) -> f64 {
    let denom = n as f64 - edf;
    if denom <= 1.0 {
        return f64::INFINITY;
    }
    n as f64 * deviance / (denom * denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;

    #[test]
    fn test_second_difference_penalty_kills_lines() {
        let s = penalty_matrix(6, 2);
        let line: Array1<f64> = (0..6).map(|i| 3.0 - 0.5 * i as f64).collect();
        let quad = line.dot(&s.dot(&line));
        assert_abs_diff_eq!(quad, 0.0, epsilon = 1e-12);

        let bumpy = Array1::from(vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        assert!(bumpy.dot(&s.dot(&bumpy)) > 1.0);
    }

    #[test]
    fn test_cyclic_penalty_kills_constants_only() {
        let s = cyclic_penalty_matrix(8);
        let constant = Array1::from_elem(8, 2.5);
        assert_abs_diff_eq!(constant.dot(&s.dot(&constant)), 0.0, epsilon = 1e-12);

        // A line is not periodic: its wrap-around difference is penalized
        let line: Array1<f64> = (0..8).map(|i| i as f64).collect();
        assert!(line.dot(&s.dot(&line)) > 1.0);
    }

    #[test]
    fn test_gcv_score_blows_up_when_edf_reaches_n() {
        assert!(gcv_score(1.0, 10, 9.5).is_infinite());
        assert_abs_diff_eq!(gcv_score(8.0, 10, 8.0), 20.0, epsilon = 1e-12);
    }
}
