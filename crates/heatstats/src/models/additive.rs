// =============================================================================
// Additive Models of the Ocean Heat Series (models 1-3)
// =============================================================================
//
// All three model AO against the positional time index, and models 2 and 3
// add a cyclic seasonal smooth of month. Model 3 additionally lets the
// errors follow an AR(1) process in time order, so its smoothing parameters
// and ρ come from REML on the whitened problem instead of GCV.
//
// =============================================================================

use ndarray::{Array1, Array2};
use tracing::{debug, info};

use heatstats_core::diagnostics::{
    adjusted_r_squared, aic, bic, deviance_explained, null_deviance, resid_response,
};
use heatstats_core::{
    fit_ar1_smooth, fit_smooth_glm, smooth_term_test, Ar1Config, Family, GaussianFamily,
    IdentityLink, SmoothBasis, SmoothGLMConfig, SmoothTermData,
};

use super::{
    CoefficientRow, FitStats, FittedModel, ModelId, ResidualKind, SmoothTermRow, TermContribution,
};
use crate::config::ModelsConfig;
use crate::error::{AnalysisError, Result};
use crate::features::PreparedOceanHeat;

/// A smooth term together with the covariate it was built on.
struct Smooth {
    basis: SmoothBasis,
    x: Array1<f64>,
}

impl Smooth {
    fn label(&self) -> String {
        format!("{}({})", self.basis.kind.label(), self.basis.name)
    }
}

fn covariates(ocean: &PreparedOceanHeat) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    let y = Array1::from(ocean.ao());
    let time = ocean.table.time.iter().map(|&t| t as f64).collect();
    let months = ocean.months.iter().map(|&m| f64::from(m)).collect();
    (y, time, months)
}

fn time_smooth(id: ModelId, time: &Array1<f64>, k: usize) -> Result<Smooth> {
    let basis = SmoothBasis::bspline("time", time, k).map_err(|e| AnalysisError::convergence(id, e))?;
    Ok(Smooth {
        basis,
        x: time.clone(),
    })
}

fn month_smooth(id: ModelId, months: &Array1<f64>, k: usize, models: &ModelsConfig) -> Result<Smooth> {
    let [a, b] = models.month_period;
    let basis = SmoothBasis::cyclic("months", months, k, (a, b))
        .map_err(|e| AnalysisError::convergence(id, e))?;
    Ok(Smooth {
        basis,
        x: months.clone(),
    })
}

fn intercept(n: usize) -> Array2<f64> {
    Array2::ones((n, 1))
}

/// Smooth-term table rows and partial effects, shared by both solvers.
fn smooth_tables(
    smooths: &[Smooth],
    edfs: &[f64],
    lambdas: &[f64],
    residual_df: f64,
    block: impl Fn(usize) -> (Array1<f64>, Array2<f64>),
    contribution: impl Fn(usize) -> (Array1<f64>, Array1<f64>),
) -> (Vec<SmoothTermRow>, Vec<TermContribution>) {
    smooths
        .iter()
        .enumerate()
        .map(|(i, smooth)| {
            let (beta, cov) = block(i);
            let test = smooth_term_test(&beta, &cov, edfs[i], residual_df);
            let row = SmoothTermRow {
                name: smooth.label(),
                k: smooth.basis.k,
                edf: edfs[i],
                ref_df: test.ref_df,
                lambda: lambdas[i],
                f_stat: test.f_stat,
                p_value: test.p_value,
            };
            let (fit, se) = contribution(i);
            let contrib = TermContribution {
                term: smooth.label(),
                x: smooth.x.to_vec(),
                fit: fit.to_vec(),
                se: se.to_vec(),
            };
            (row, contrib)
        })
        .unzip()
}

// =============================================================================
// Models 1 and 2: Gaussian additive model, GCV
// =============================================================================

/// Model 1: AO ~ s(time).
pub fn fit_trend(ocean: &PreparedOceanHeat, models: &ModelsConfig) -> Result<FittedModel> {
    let id = ModelId::TrendSpline;
    let (y, time, _) = covariates(ocean);
    let smooths = vec![time_smooth(id, &time, models.trend_k)?];
    fit_gaussian_additive(id, &y, smooths)
}

/// Model 2: AO ~ s(time) + cc(months).
pub fn fit_trend_seasonal(ocean: &PreparedOceanHeat, models: &ModelsConfig) -> Result<FittedModel> {
    let id = ModelId::TrendSeasonal;
    let (y, time, months) = covariates(ocean);
    let smooths = vec![
        time_smooth(id, &time, models.trend_seasonal_time_k)?,
        month_smooth(id, &months, models.trend_seasonal_month_k, models)?,
    ];
    fit_gaussian_additive(id, &y, smooths)
}

fn fit_gaussian_additive(id: ModelId, y: &Array1<f64>, smooths: Vec<Smooth>) -> Result<FittedModel> {
    let n = y.len();
    let terms: Vec<SmoothTermData> = smooths.iter().map(|s| SmoothTermData::from(&s.basis)).collect();
    let family = GaussianFamily;

    let fit = fit_smooth_glm(y, &intercept(n), &terms, &family, &IdentityLink, &SmoothGLMConfig::default())
        .map_err(|e| AnalysisError::convergence(id, e))?;

    if !fit.converged {
        return Err(AnalysisError::convergence(
            id,
            format!("penalized IRLS stopped after {} iterations", fit.iterations),
        ));
    }

    let residual_df = fit.residual_df();
    let se = fit.std_errors();

    let coefficients = vec![CoefficientRow::from_estimate(
        "(Intercept)",
        fit.coefficients[0],
        se[0],
        residual_df,
        false,
    )];

    let (smooth_terms, term_contributions) = smooth_tables(
        &smooths,
        &fit.smooth_edfs,
        &fit.lambdas,
        residual_df,
        |i| fit.term_block(i),
        |i| fit.term_contribution(i),
    );

    let null_dev = null_deviance(y, &family);
    // Gaussian likelihood at the ML variance, with the EDF and σ² as parameters
    let llf = family.log_likelihood(y, &fit.fitted_values, fit.deviance / n as f64);
    let n_params = fit.total_edf + 1.0;

    let fit_stats = FitStats {
        n_obs: n,
        edf: fit.total_edf,
        residual_df,
        scale: fit.scale,
        deviance: fit.deviance,
        null_deviance: null_dev,
        deviance_explained: deviance_explained(fit.deviance, null_dev),
        adj_r_squared: Some(adjusted_r_squared(y, &fit.fitted_values, residual_df)),
        gcv: Some(fit.gcv),
        reml: None,
        rho: None,
        log_likelihood: Some(llf),
        aic: Some(aic(llf, n_params)),
        bic: Some(bic(llf, n_params, n)),
        iterations: fit.iterations,
    };

    info!(
        model = id.slug(),
        edf = fit.total_edf,
        gcv = fit.gcv,
        scale = fit.scale,
        "Fitted additive model"
    );
    debug!(model = id.slug(), lambdas = ?fit.lambdas, "Selected smoothing parameters");

    Ok(FittedModel {
        id,
        formula: format!(
            "AO ~ {}",
            smooths.iter().map(Smooth::label).collect::<Vec<_>>().join(" + ")
        ),
        coefficients,
        smooth_terms,
        observed: y.to_vec(),
        fitted: fit.fitted_values.to_vec(),
        residuals: resid_response(y, &fit.fitted_values).to_vec(),
        residual_kind: ResidualKind::Response,
        fit_stats,
        converged: fit.converged,
        term_contributions,
    })
}

// =============================================================================
// Model 3: additive model with AR(1) errors, REML
// =============================================================================

/// Model 3: AO ~ s(time) + cc(months) with AR(1) errors in time order.
pub fn fit_trend_seasonal_ar1(ocean: &PreparedOceanHeat, models: &ModelsConfig) -> Result<FittedModel> {
    let id = ModelId::TrendSeasonalAr1;
    let (y, time, months) = covariates(ocean);
    let n = y.len();
    let smooths = vec![
        time_smooth(id, &time, models.ar1_time_k)?,
        month_smooth(id, &months, models.ar1_month_k, models)?,
    ];
    let terms: Vec<SmoothTermData> = smooths.iter().map(|s| SmoothTermData::from(&s.basis)).collect();

    let fit = fit_ar1_smooth(&y, &intercept(n), &terms, &Ar1Config::default())
        .map_err(|e| AnalysisError::convergence(id, e))?;

    if !fit.converged {
        return Err(AnalysisError::convergence(
            id,
            format!("search on rho stopped after {} iterations", fit.iterations),
        ));
    }

    let residual_df = fit.residual_df();
    let se = fit.std_errors();
    let coefficients = vec![CoefficientRow::from_estimate(
        "(Intercept)",
        fit.coefficients[0],
        se[0],
        residual_df,
        false,
    )];

    let (smooth_terms, term_contributions) = smooth_tables(
        &smooths,
        &fit.smooth_edfs,
        &fit.lambdas,
        residual_df,
        |i| fit.term_block(i),
        |i| fit.term_contribution(i),
    );

    let family = GaussianFamily;
    let rss = fit.residuals.mapv(|r| r * r).sum();
    let null_dev = null_deviance(&y, &family);

    let fit_stats = FitStats {
        n_obs: n,
        edf: fit.total_edf,
        residual_df,
        scale: fit.sigma2,
        deviance: rss,
        null_deviance: null_dev,
        deviance_explained: deviance_explained(rss, null_dev),
        adj_r_squared: Some(adjusted_r_squared(&y, &fit.fitted_values, residual_df)),
        gcv: None,
        reml: Some(fit.reml),
        rho: Some(fit.rho),
        log_likelihood: None,
        aic: None,
        bic: None,
        iterations: fit.iterations,
    };

    info!(
        model = id.slug(),
        rho = fit.rho,
        sigma = fit.sigma2.sqrt(),
        edf = fit.total_edf,
        "Fitted additive model with AR(1) errors"
    );

    Ok(FittedModel {
        id,
        formula: format!(
            "AO ~ {}, correlation = AR(1) in time",
            smooths.iter().map(Smooth::label).collect::<Vec<_>>().join(" + ")
        ),
        coefficients,
        smooth_terms,
        observed: y.to_vec(),
        fitted: fit.fitted_values.to_vec(),
        residuals: fit.normalized_residuals.to_vec(),
        residual_kind: ResidualKind::Normalized,
        fit_stats,
        converged: fit.converged,
        term_contributions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{OceanHeatRecord, OceanHeatTable};
    use crate::features::prepare_ocean_heat;
    use chrono::NaiveDate;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Ten years of monthly data: linear trend, annual cycle, AR(1) noise.
    fn synthetic_series(phi: f64) -> PreparedOceanHeat {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut e = 0.0;
        let mut records = Vec::new();
        for year in 2005..2015 {
            for month in 1..=12u32 {
                e = phi * e + rng.random_range(-0.5..0.5);
                let t = records.len() as f64;
                let season = (2.0 * std::f64::consts::PI * f64::from(month) / 12.0).sin();
                records.push(OceanHeatRecord {
                    date: NaiveDate::from_ymd_opt(year, month, 1).unwrap(),
                    ao: 10.0 + 0.05 * t + season + e,
                });
            }
        }
        // shuffled input order must not matter
        records.reverse();
        prepare_ocean_heat(&OceanHeatTable::from_unsorted(records))
    }

    fn small_bases() -> ModelsConfig {
        ModelsConfig {
            trend_k: 10,
            trend_seasonal_time_k: 10,
            trend_seasonal_month_k: 8,
            ar1_time_k: 10,
            ar1_month_k: 6,
            month_period: [0.5, 12.5],
        }
    }

    #[test]
    fn test_trend_model() {
        let ocean = synthetic_series(0.0);
        let model = fit_trend(&ocean, &small_bases()).unwrap();
        assert_eq!(model.id, ModelId::TrendSpline);
        assert_eq!(model.smooth_terms.len(), 1);
        assert_eq!(model.smooth_terms[0].name, "ps(time)");
        assert_eq!(model.fitted.len(), 120);
        assert_eq!(model.residual_kind, ResidualKind::Response);
        let stats = &model.fit_stats;
        assert!(stats.edf > 1.0 && stats.edf < 10.0);
        assert!(stats.deviance_explained > 0.5);
        // the trend is far from flat
        assert!(model.smooth_terms[0].p_value < 0.001);
    }

    #[test]
    fn test_trend_seasonal_model_recovers_season() {
        let ocean = synthetic_series(0.0);
        let model = fit_trend_seasonal(&ocean, &small_bases()).unwrap();
        assert_eq!(model.smooth_terms.len(), 2);
        assert_eq!(model.smooth_terms[1].name, "cp(months)");
        assert_eq!(model.term_contributions.len(), 2);

        let seasonal = &model.term_contributions[1];
        // March (sin > 0) above September (sin < 0)
        let at = |m: f64| {
            seasonal
                .x
                .iter()
                .position(|&x| x == m)
                .map(|i| seasonal.fit[i])
                .unwrap()
        };
        assert!(at(3.0) > at(9.0));
        assert!(model.fit_stats.adj_r_squared.unwrap() > 0.8);
    }

    #[test]
    fn test_ar1_model() {
        let ocean = synthetic_series(0.6);
        let model = fit_trend_seasonal_ar1(&ocean, &small_bases()).unwrap();
        assert_eq!(model.residual_kind, ResidualKind::Normalized);
        assert_eq!(model.residuals.len(), 120);
        let rho = model.fit_stats.rho.unwrap();
        assert!(rho > 0.2 && rho < 0.95, "rho = {rho}");
        assert!(model.fit_stats.reml.unwrap().is_finite());
        for c in &model.term_contributions {
            assert!(c.se.iter().all(|s| s.is_finite() && *s >= 0.0));
        }
    }

    #[test]
    fn test_too_short_series_is_tagged_failure() {
        let records = (1..=2u32)
            .map(|m| OceanHeatRecord {
                date: NaiveDate::from_ymd_opt(2005, m, 1).unwrap(),
                ao: f64::from(m),
            })
            .collect();
        let ocean = prepare_ocean_heat(&OceanHeatTable::from_unsorted(records));
        match fit_trend_seasonal_ar1(&ocean, &small_bases()) {
            Err(AnalysisError::ModelConvergence { model, .. }) => {
                assert_eq!(model, ModelId::TrendSeasonalAr1)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
