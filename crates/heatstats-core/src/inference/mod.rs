// =============================================================================
// Statistical Inference
// =============================================================================
//
// This module turns fitted coefficients into the numbers a summary table
// prints:
//   - P-values: is a coefficient distinguishable from zero?
//   - Confidence intervals: a range for the true parameter value
//   - Smooth-term tests: is a whole smooth s(x) distinguishable from zero?
//
// Example: the storm model gives β for "Year2010" = 0.12 on the log scale.
//   - p-value < 0.05 → the 2010 level differs from the reference year
//   - 95% CI = [0.02, 0.22] → exp(CI) = [1.02, 1.25] as a ratio of means
//
// IMPORTANT CAVEATS:
// - Statistical significance ≠ practical significance
// - Smooth-term p-values are approximate: they condition on the selected λ
//
// =============================================================================

use ndarray::{Array1, Array2};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal, StudentsT};

use crate::convert::truncated_pinv;

// =============================================================================
// P-Value Calculation
// =============================================================================

/// Two-tailed p-value from a z-statistic (standard normal reference).
///
/// # Interpretation
/// - p < 0.05: Traditionally "significant" at 5% level
/// - p < 0.01: "Highly significant" at 1% level
/// - p < 0.001: "Very highly significant"
pub fn pvalue_z(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    let normal = match Normal::new(0.0, 1.0) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };

    // P(|Z| > |z|) = 2 * (1 - Φ(|z|))
    2.0 * (1.0 - normal.cdf(z.abs()))
}

/// Two-tailed p-value from a t-statistic with `df` degrees of freedom.
///
/// Used whenever the scale is estimated (Gaussian, Gamma).
pub fn pvalue_t(t: f64, df: f64) -> f64 {
    if !t.is_finite() || df <= 0.0 {
        return f64::NAN;
    }

    // For very large df, use normal approximation
    if df > 1000.0 {
        return pvalue_z(t);
    }

    let t_dist = match StudentsT::new(0.0, 1.0, df) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };

    2.0 * (1.0 - t_dist.cdf(t.abs()))
}

/// Upper-tail p-value of an F statistic with (df1, df2) degrees of freedom.
pub fn pvalue_f(f: f64, df1: f64, df2: f64) -> f64 {
    if !f.is_finite() || df1 <= 0.0 || df2 <= 0.0 {
        return f64::NAN;
    }
    if f <= 0.0 {
        return 1.0;
    }
    let f_dist = match FisherSnedecor::new(df1, df2) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };
    (1.0 - f_dist.cdf(f)).max(0.0)
}

// =============================================================================
// Confidence Intervals
// =============================================================================

/// Confidence interval using the normal distribution.
///
/// # Returns
/// (lower_bound, upper_bound)
pub fn confidence_interval_z(estimate: f64, std_error: f64, confidence: f64) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let normal = match Normal::new(0.0, 1.0) {
        Ok(d) => d,
        Err(_) => return (f64::NAN, f64::NAN),
    };

    // For 95% CI, alpha = 0.05, so we need z_{0.975}
    let alpha = 1.0 - confidence;
    let z_critical = normal.inverse_cdf(1.0 - alpha / 2.0);

    let margin = z_critical * std_error;
    (estimate - margin, estimate + margin)
}

/// Confidence interval using the t-distribution with `df` degrees of freedom.
///
/// For a log link, exp() of the bounds is the interval for the ratio of means.
pub fn confidence_interval_t(
    estimate: f64,
    std_error: f64,
    df: f64,
    confidence: f64,
) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error <= 0.0 || df <= 0.0 {
        return (f64::NAN, f64::NAN);
    }

    if df > 1000.0 {
        return confidence_interval_z(estimate, std_error, confidence);
    }

    let t_dist = match StudentsT::new(0.0, 1.0, df) {
        Ok(d) => d,
        Err(_) => return (f64::NAN, f64::NAN),
    };

    let alpha = 1.0 - confidence;
    let t_critical = t_dist.inverse_cdf(1.0 - alpha / 2.0);

    let margin = t_critical * std_error;
    (estimate - margin, estimate + margin)
}

// =============================================================================
// Significance Stars (for summary tables)
// =============================================================================

/// Get significance stars for a p-value.
///
/// - "***" : p < 0.001
/// - "**"  : p < 0.01
/// - "*"   : p < 0.05
/// - "."   : p < 0.1
/// - ""    : p >= 0.1
pub fn significance_stars(pvalue: f64) -> &'static str {
    if pvalue < 0.001 {
        "***"
    } else if pvalue < 0.01 {
        "**"
    } else if pvalue < 0.05 {
        "*"
    } else if pvalue < 0.1 {
        "."
    } else {
        ""
    }
}

// =============================================================================
// Smooth-term Wald test
// =============================================================================
//
// For a smooth with coefficients βⱼ and Bayesian covariance Vⱼ we test
// H₀: sⱼ(x) = 0 with
//
//     Tr = βⱼ' Vⱼ⁻ βⱼ,   F = Tr / r
//
// where Vⱼ⁻ is the rank-r pseudo-inverse keeping the r largest eigenvalues
// and r = ⌈EDFⱼ⌉. F is referred to F(r, n - EDF_total).
//
// =============================================================================

/// Outcome of a smooth-term test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothTermTest {
    /// Reference degrees of freedom r
    pub ref_df: f64,
    /// F statistic
    pub f_stat: f64,
    /// Upper-tail p-value
    pub p_value: f64,
}

/// Wald-type F test that a smooth term is identically zero.
pub fn smooth_term_test(
    beta: &Array1<f64>,
    covariance: &Array2<f64>,
    edf: f64,
    residual_df: f64,
) -> SmoothTermTest {
    let k = beta.len();
    let r = (edf.ceil() as usize).clamp(1, k.max(1));
    let v_pinv = truncated_pinv(covariance, r);
    let tr = beta.dot(&v_pinv.dot(beta));
    let f_stat = tr / r as f64;
    SmoothTermTest {
        ref_df: r as f64,
        f_stat,
        p_value: pvalue_f(f_stat, r as f64, residual_df),
    }
}

// =============================================================================
// Tests
// =============================================================================
