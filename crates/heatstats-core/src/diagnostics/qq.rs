// =============================================================================
// Normal QQ
// =============================================================================

use ndarray::Array1;
use statrs::distribution::{ContinuousCDF, Normal};

/// One point of a normal QQ plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QQPoint {
    pub theoretical: f64,
    pub sample: f64,
}

/// Plotting positions (i - a) / (n + 1 - 2a), i = 1..n,
/// with a = 3/8 for n ≤ 10 and 1/2 otherwise.
pub fn ppoints(n: usize) -> Array1<f64> {
    let a = if n <= 10 { 0.375 } else { 0.5 };
    let denom = n as f64 + 1.0 - 2.0 * a;
    Array1::from_iter((1..=n).map(|i| (i as f64 - a) / denom))
}

/// (x - x̄) / s with the n - 1 standard deviation. Returns the input unchanged
/// when it has fewer than two values or zero spread.
pub fn standardize(x: &Array1<f64>) -> Array1<f64> {
    let n = x.len();
    if n < 2 {
        return x.clone();
    }
    let mean = x.sum() / n as f64;
    let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    if var <= 0.0 {
        return x.clone();
    }
    let sd = var.sqrt();
    x.mapv(|v| (v - mean) / sd)
}

/// Sorted sample values paired with standard normal quantiles.
///
/// Non-finite residuals are dropped before ranking.
pub fn normal_qq(residuals: &Array1<f64>) -> Vec<QQPoint> {
    let mut sample: Vec<f64> = residuals.iter().copied().filter(|v| v.is_finite()).collect();
    sample.sort_by(f64::total_cmp);

    let normal = match Normal::new(0.0, 1.0) {
        Ok(d) => d,
        Err(_) => return Vec::new(),
    };
    ppoints(sample.len())
        .iter()
        .zip(sample)
        .map(|(&p, s)| QQPoint {
            theoretical: normal.inverse_cdf(p),
            sample: s,
        })
        .collect()
}
