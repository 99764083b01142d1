// =============================================================================
// Diagnostic Reporter
// =============================================================================
//
// Read-only views of a fitted model:
//   - residual vs fitted pairs
//   - standardized residuals against normal quantiles (QQ)
//   - residual autocorrelation up to a lag window, with the white-noise band
//   - a text summary in the familiar regression-table layout
//
// =============================================================================

use std::fmt::Write;

use ndarray::Array1;

use heatstats_core::diagnostics::{acf, default_max_lag, normal_qq, standardize, white_noise_band, QQPoint};

use crate::error::AnalysisError;
use crate::models::{FittedModel, ModelId};

/// Diagnostics derived from one model's residuals.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDiagnostics {
    /// (fitted, residual) per observation
    pub residual_vs_fitted: Vec<(f64, f64)>,
    pub qq: Vec<QQPoint>,
    /// ACF at lags 0..=max_lag
    pub acf: Vec<f64>,
    pub max_lag: usize,
    /// Half-width of the 95% white-noise band
    pub acf_band: f64,
}

impl ModelDiagnostics {
    /// Lags (≥ 1) whose autocorrelation lies outside the white-noise band.
    pub fn significant_lags(&self) -> Vec<usize> {
        self.acf
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, r)| r.abs() > self.acf_band)
            .map(|(h, _)| h)
            .collect()
    }
}

/// Compute diagnostics. `acf_max_lag` of 0 selects ⌊10 log₁₀ n⌋.
pub fn diagnose(model: &FittedModel, acf_max_lag: usize) -> ModelDiagnostics {
    let residuals = Array1::from(model.residuals.clone());
    let n = residuals.len();
    let max_lag = if acf_max_lag == 0 {
        default_max_lag(n)
    } else {
        acf_max_lag.min(n.saturating_sub(1))
    };

    ModelDiagnostics {
        residual_vs_fitted: model
            .fitted
            .iter()
            .copied()
            .zip(model.residuals.iter().copied())
            .collect(),
        qq: normal_qq(&standardize(&residuals)),
        acf: acf(&residuals, max_lag).to_vec(),
        max_lag,
        acf_band: white_noise_band(n),
    }
}

fn fmt_num(v: f64) -> String {
    if !v.is_finite() {
        "NA".to_string()
    } else if v != 0.0 && (v.abs() < 1e-3 || v.abs() >= 1e6) {
        format!("{:.3e}", v)
    } else {
        format!("{:.4}", v)
    }
}

fn fmt_p(p: f64) -> String {
    if !p.is_finite() {
        "NA".to_string()
    } else if p < 2e-16 {
        "<2e-16".to_string()
    } else {
        fmt_num(p)
    }
}

/// Text summary of a fitted model and its diagnostics.
pub fn format_summary(model: &FittedModel, diagnostics: &ModelDiagnostics) -> String {
    let mut out = String::new();
    let rule = "=".repeat(78);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{}", model.id.title());
    let _ = writeln!(out, "{}", model.formula);
    let _ = writeln!(out, "{rule}");

    if !model.coefficients.is_empty() {
        let with_ratio = model.coefficients.iter().any(|c| c.ratio.is_some());
        let _ = writeln!(out, "\nParametric coefficients:");
        let _ = write!(
            out,
            "{:<22} {:>11} {:>11} {:>9} {:>10} {:>11} {:>11}",
            "", "Estimate", "Std. Error", "t value", "Pr(>|t|)", "2.5 %", "97.5 %"
        );
        if with_ratio {
            let _ = write!(out, " {:>10}", "exp(Est)");
        }
        let _ = writeln!(out);
        for c in &model.coefficients {
            let _ = write!(
                out,
                "{:<22} {:>11} {:>11} {:>9} {:>10} {:>11} {:>11}",
                c.name,
                fmt_num(c.estimate),
                fmt_num(c.std_error),
                format!("{:.3}", c.statistic),
                fmt_p(c.p_value),
                fmt_num(c.conf_low),
                fmt_num(c.conf_high),
            );
            if let Some(r) = c.ratio {
                let _ = write!(out, " {:>10}", fmt_num(r));
            }
            let _ = writeln!(out, " {}", c.stars());
        }
    }

    if !model.smooth_terms.is_empty() {
        let _ = writeln!(out, "\nApproximate significance of smooth terms:");
        let _ = writeln!(
            out,
            "{:<14} {:>4} {:>8} {:>8} {:>11} {:>9} {:>10}",
            "", "k", "edf", "Ref.df", "lambda", "F", "p-value"
        );
        for s in &model.smooth_terms {
            let _ = writeln!(
                out,
                "{:<14} {:>4} {:>8.3} {:>8.0} {:>11} {:>9.3} {:>10} {}",
                s.name,
                s.k,
                s.edf,
                s.ref_df,
                fmt_num(s.lambda),
                s.f_stat,
                fmt_p(s.p_value),
                heatstats_core::significance_stars(s.p_value)
            );
        }
    }
    let _ = writeln!(out, "---\nSignif. codes:  0 '***' 0.001 '**' 0.01 '*' 0.05 '.' 0.1 ' ' 1");

    let st = &model.fit_stats;
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "n = {}   EDF = {:.3}   residual df = {:.3}   scale = {}",
        st.n_obs,
        st.edf,
        st.residual_df,
        fmt_num(st.scale)
    );
    let _ = writeln!(
        out,
        "Deviance = {}   Null deviance = {}   Deviance explained = {:.1}%",
        fmt_num(st.deviance),
        fmt_num(st.null_deviance),
        100.0 * st.deviance_explained
    );
    let mut extras = Vec::new();
    if let Some(r2) = st.adj_r_squared {
        extras.push(format!("R-sq.(adj) = {:.3}", r2));
    }
    if let Some(g) = st.gcv {
        extras.push(format!("GCV = {}", fmt_num(g)));
    }
    if let Some(r) = st.reml {
        extras.push(format!("REML = {}", fmt_num(r)));
    }
    if let Some(rho) = st.rho {
        extras.push(format!("AR(1) Phi = {:.4}", rho));
    }
    if let Some(l) = st.log_likelihood {
        extras.push(format!("logLik = {}", fmt_num(l)));
    }
    if let Some(a) = st.aic {
        extras.push(format!("AIC = {}", fmt_num(a)));
    }
    if let Some(b) = st.bic {
        extras.push(format!("BIC = {}", fmt_num(b)));
    }
    if !extras.is_empty() {
        let _ = writeln!(out, "{}", extras.join("   "));
    }
    let _ = writeln!(
        out,
        "Converged: {} ({} iterations)",
        if model.converged { "yes" } else { "no" },
        st.iterations
    );

    let _ = writeln!(
        out,
        "\nResidual ACF ({} residuals, lags 1..{}, band ±{:.3}):",
        model.residual_kind.label(),
        diagnostics.max_lag,
        diagnostics.acf_band
    );
    let acf_line: Vec<String> = diagnostics
        .acf
        .iter()
        .skip(1)
        .map(|r| format!("{:.3}", r))
        .collect();
    let _ = writeln!(out, "  {}", acf_line.join(" "));
    let sig = diagnostics.significant_lags();
    if sig.is_empty() {
        let _ = writeln!(out, "  no lag outside the white-noise band");
    } else {
        let lags: Vec<String> = sig.iter().map(|h| h.to_string()).collect();
        let _ = writeln!(out, "  lags outside the band: {}", lags.join(", "));
    }

    out
}

/// Final list of which models were reported and which failed.
pub fn format_run_summary(outcomes: &[(ModelId, Result<(), String>)]) -> String {
    let mut out = String::from("Run summary:\n");
    for (id, outcome) in outcomes {
        let _ = match outcome {
            Ok(()) => writeln!(out, "  [ok]     {}", id.title()),
            Err(reason) => writeln!(out, "  [failed] {}: {}", id.title(), reason),
        };
    }
    out
}

/// Reason text for a failed model.
pub fn failure_reason(err: &AnalysisError) -> String {
    match err {
        AnalysisError::ModelConvergence { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoefficientRow, FitStats, ResidualKind, SmoothTermRow};
    use approx::assert_abs_diff_eq;

    fn model(residuals: Vec<f64>) -> FittedModel {
        let n = residuals.len();
        FittedModel {
            id: ModelId::TrendSpline,
            formula: "AO ~ ps(time)".to_string(),
            coefficients: vec![CoefficientRow::from_estimate("(Intercept)", 5.0, 0.1, 50.0, false)],
            smooth_terms: vec![SmoothTermRow {
                name: "ps(time)".to_string(),
                k: 10,
                edf: 3.2,
                ref_df: 4.0,
                lambda: 12.0,
                f_stat: 30.0,
                p_value: 1e-20,
            }],
            observed: vec![0.0; n],
            fitted: (0..n).map(|i| i as f64).collect(),
            residuals,
            residual_kind: ResidualKind::Response,
            fit_stats: FitStats {
                n_obs: n,
                ..FitStats::default()
            },
            converged: true,
            term_contributions: Vec::new(),
        }
    }

    #[test]
    fn test_diagnose_default_window() {
        let residuals: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let d = diagnose(&model(residuals), 0);
        assert_eq!(d.max_lag, 20);
        assert_eq!(d.acf.len(), 21);
        assert_eq!(d.acf[0], 1.0);
        assert_abs_diff_eq!(d.acf_band, 0.196, epsilon = 1e-12);
        // an alternating series is autocorrelated at every lag
        assert_eq!(d.significant_lags().len(), 20);
        assert_eq!(d.qq.len(), 100);
        assert_eq!(d.residual_vs_fitted[1], (1.0, -1.0));
    }

    #[test]
    fn test_diagnose_explicit_lag_is_capped() {
        let d = diagnose(&model(vec![0.3, -0.1, 0.2, -0.4]), 50);
        assert_eq!(d.max_lag, 3);
    }

    #[test]
    fn test_summary_mentions_terms() {
        let m = model(vec![0.3, -0.1, 0.2, -0.4, 0.1]);
        let text = format_summary(&m, &diagnose(&m, 0));
        assert!(text.contains("Model 1"));
        assert!(text.contains("(Intercept)"));
        assert!(text.contains("ps(time)"));
        assert!(text.contains("<2e-16"));
        assert!(text.contains("Residual ACF"));
    }

    #[test]
    fn test_run_summary() {
        let text = format_run_summary(&[
            (ModelId::TrendSpline, Ok(())),
            (ModelId::TrendSeasonalAr1, Err("rho at boundary".to_string())),
        ]);
        assert!(text.contains("[ok]     Model 1"));
        assert!(text.contains("[failed] Model 3"));
        assert!(text.contains("rho at boundary"));
    }
}
