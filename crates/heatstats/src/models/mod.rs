// =============================================================================
// Model Fitter
// =============================================================================
//
// The four report models, each fitted independently:
//
//   Model 1   AO ~ s(time, k = 55)                             GCV
//   Model 2   AO ~ s(time, k = 45) + cc(months, k = 12)        GCV
//   Model 3   AO ~ s(time, k = 45) + cc(months, k = 8),  AR(1) errors, REML
//   Model 4   AO ~ Year + Max_Wind + TS_H,  Gamma with log link
//
// Every runner turns its solver result into a `FittedModel`, so the
// reporter and the plots never see solver-specific structs. Any solver error
// or non-converged fit becomes `AnalysisError::ModelConvergence` tagged with
// the model's id.
//
// =============================================================================

mod additive;
mod storm;

pub use additive::{fit_trend, fit_trend_seasonal, fit_trend_seasonal_ar1};
pub use storm::fit_storm_intensity;

use std::fmt;

use heatstats_core::{confidence_interval_t, pvalue_t, significance_stars};

/// Identifies one of the four models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelId {
    TrendSpline,
    TrendSeasonal,
    TrendSeasonalAr1,
    StormIntensity,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [
        ModelId::TrendSpline,
        ModelId::TrendSeasonal,
        ModelId::TrendSeasonalAr1,
        ModelId::StormIntensity,
    ];

    /// File-name prefix of the model's plots.
    pub fn slug(self) -> &'static str {
        match self {
            ModelId::TrendSpline => "model1_trend",
            ModelId::TrendSeasonal => "model2_trend_seasonal",
            ModelId::TrendSeasonalAr1 => "model3_trend_seasonal_ar1",
            ModelId::StormIntensity => "model4_storm_intensity",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ModelId::TrendSpline => "Model 1: long-term trend spline",
            ModelId::TrendSeasonal => "Model 2: trend + seasonality",
            ModelId::TrendSeasonalAr1 => "Model 3: trend + seasonality + AR(1) errors",
            ModelId::StormIntensity => "Model 4: storm intensity (Gamma, log link)",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// One row of a parametric coefficient table.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// t statistic
    pub statistic: f64,
    pub p_value: f64,
    pub conf_low: f64,
    pub conf_high: f64,
    /// exp(β), set for log-link models.
    pub ratio: Option<f64>,
}

impl CoefficientRow {
    /// t-based row with `df` residual degrees of freedom and a 95% interval.
    pub fn from_estimate(name: &str, estimate: f64, std_error: f64, df: f64, log_link: bool) -> Self {
        let statistic = if std_error > 0.0 {
            estimate / std_error
        } else {
            f64::NAN
        };
        let (conf_low, conf_high) = confidence_interval_t(estimate, std_error, df, 0.95);
        Self {
            name: name.to_string(),
            estimate,
            std_error,
            statistic,
            p_value: pvalue_t(statistic, df),
            conf_low,
            conf_high,
            ratio: log_link.then(|| estimate.exp()),
        }
    }

    pub fn stars(&self) -> &'static str {
        significance_stars(self.p_value)
    }
}

/// One row of a smooth-term table.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothTermRow {
    /// e.g. `ps(time)` or `cp(months)`
    pub name: String,
    /// Basis dimension before the identifiability constraint.
    pub k: usize,
    pub edf: f64,
    pub ref_df: f64,
    pub lambda: f64,
    pub f_stat: f64,
    pub p_value: f64,
}

/// What the stored residuals are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualKind {
    /// y - fitted
    Response,
    /// sign(y - μ)√d(y, μ)
    Deviance,
    /// Whitened AR(1) residuals divided by σ̂
    Normalized,
}

impl ResidualKind {
    pub fn label(self) -> &'static str {
        match self {
            ResidualKind::Response => "response",
            ResidualKind::Deviance => "deviance",
            ResidualKind::Normalized => "normalized",
        }
    }
}

/// Goodness-of-fit numbers. Fields that do not apply to a model are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitStats {
    pub n_obs: usize,
    /// Total effective degrees of freedom (number of coefficients for a GLM).
    pub edf: f64,
    pub residual_df: f64,
    /// φ: σ² for Gaussian fits, the Pearson dispersion for Gamma.
    pub scale: f64,
    pub deviance: f64,
    pub null_deviance: f64,
    pub deviance_explained: f64,
    pub adj_r_squared: Option<f64>,
    pub gcv: Option<f64>,
    pub reml: Option<f64>,
    pub rho: Option<f64>,
    pub log_likelihood: Option<f64>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
    pub iterations: usize,
}

/// Partial effect of one smooth term on the link scale.
#[derive(Debug, Clone, PartialEq)]
pub struct TermContribution {
    pub term: String,
    /// Covariate value of each observation.
    pub x: Vec<f64>,
    pub fit: Vec<f64>,
    pub se: Vec<f64>,
}

/// A fitted model in solver-independent form.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    pub id: ModelId,
    pub formula: String,
    pub coefficients: Vec<CoefficientRow>,
    pub smooth_terms: Vec<SmoothTermRow>,
    /// Response, in row order.
    pub observed: Vec<f64>,
    /// Fitted values on the response scale.
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub residual_kind: ResidualKind,
    pub fit_stats: FitStats,
    pub converged: bool,
    pub term_contributions: Vec<TermContribution>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_coefficient_row() {
        let row = CoefficientRow::from_estimate("x", 0.2, 0.05, 30.0, true);
        assert_abs_diff_eq!(row.statistic, 4.0, epsilon = 1e-12);
        assert!(row.p_value < 0.001);
        assert_eq!(row.stars(), "***");
        assert!(row.conf_low < 0.2 && row.conf_high > 0.2);
        assert_abs_diff_eq!(row.ratio.unwrap(), 0.2f64.exp(), epsilon = 1e-12);

        let row = CoefficientRow::from_estimate("x", 0.2, 0.0, 30.0, false);
        assert!(row.statistic.is_nan());
        assert!(row.ratio.is_none());
    }

    #[test]
    fn test_slugs_are_distinct() {
        let mut slugs: Vec<&str> = ModelId::ALL.iter().map(|m| m.slug()).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), 4);
    }
}
