// =============================================================================
// Storm Intensity Model (model 4)
// =============================================================================
//
//     log E[AO] = β₀ + β_Year + β_wind × Max_Wind + β_TS_H
//
// AO is positive and right-skewed, so it is modelled as Gamma with a log
// link. Year and TS_H are categorical and enter through treatment dummies;
// exp(β) is then the ratio of expected AO to the reference level (or per
// knot of Max_Wind).
//
// Inference follows the usual estimated-dispersion GLM recipe: φ̂ is the
// Pearson χ² over n - p, standard errors are √(φ̂ diag((X'WX)⁻¹)) and the
// coefficient tests use t with n - p degrees of freedom. The likelihood used
// for AIC/BIC takes the deviance-based φ = D/n and counts φ as a parameter.
//
// =============================================================================

use ndarray::Array1;
use tracing::info;

use heatstats_core::diagnostics::{
    aic, bic, deviance_explained, estimate_dispersion_pearson, null_deviance, resid_deviance,
};
use heatstats_core::{fit_glm, DesignMatrixBuilder, Factor, Family, GammaFamily, IRLSConfig, LogLink};

use super::{CoefficientRow, FitStats, FittedModel, ModelId, ResidualKind};
use crate::error::{AnalysisError, Result};
use crate::features::PreparedStorms;

/// Model 4: Gamma GLM, AO ~ Year + Max_Wind + TS_H.
pub fn fit_storm_intensity(storms: &PreparedStorms) -> Result<FittedModel> {
    let id = ModelId::StormIntensity;
    let n = storms.len();
    let tag = |e: heatstats_core::StatsError| AnalysisError::convergence(id, e);

    let y: Array1<f64> = storms.rows.iter().map(|r| r.ao).collect();
    let wind: Array1<f64> = storms.rows.iter().map(|r| r.max_wind).collect();
    let years: Vec<i32> = storms.rows.iter().map(|r| r.year).collect();
    let types: Vec<&str> = storms.rows.iter().map(|r| r.ts_h.as_str()).collect();

    let design = DesignMatrixBuilder::new(n)
        .intercept()
        .factor("Year", &Factor::from_integers(&years))
        .map_err(tag)?
        .numeric("Max_Wind", &wind)
        .map_err(tag)?
        .factor("TS_H", &Factor::from_values(&types))
        .map_err(tag)?
        .build()
        .map_err(tag)?;

    let family = GammaFamily;
    let fit = fit_glm(&y, &design.matrix, &family, &LogLink, &IRLSConfig::default()).map_err(tag)?;
    if !fit.converged {
        return Err(AnalysisError::convergence(
            id,
            format!("IRLS did not converge in {} iterations", fit.iterations),
        ));
    }

    let p = design.matrix.ncols();
    let df_resid = n as f64 - p as f64;
    if df_resid <= 0.0 {
        return Err(AnalysisError::convergence(
            id,
            format!("{} coefficients leave no residual degrees of freedom for {} rows", p, n),
        ));
    }

    let scale = estimate_dispersion_pearson(&y, &fit.fitted_values, &family, df_resid);
    let coefficients: Vec<CoefficientRow> = design
        .names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let se = (scale * fit.covariance_unscaled[[j, j]]).max(0.0).sqrt();
            CoefficientRow::from_estimate(name, fit.coefficients[j], se, df_resid, true)
        })
        .collect();

    let null_dev = null_deviance(&y, &family);
    let llf = family.log_likelihood(&y, &fit.fitted_values, fit.deviance / n as f64);
    let n_params = p as f64 + 1.0;

    info!(
        model = id.slug(),
        coefficients = p,
        dispersion = scale,
        deviance = fit.deviance,
        "Fitted Gamma GLM"
    );

    Ok(FittedModel {
        id,
        formula: "AO ~ Year + Max_Wind + TS_H, family = Gamma(link = log)".to_string(),
        coefficients,
        smooth_terms: Vec::new(),
        observed: y.to_vec(),
        fitted: fit.fitted_values.to_vec(),
        residuals: resid_deviance(&y, &fit.fitted_values, &family).to_vec(),
        residual_kind: ResidualKind::Deviance,
        fit_stats: FitStats {
            n_obs: n,
            edf: p as f64,
            residual_df: df_resid,
            scale,
            deviance: fit.deviance,
            null_deviance: null_dev,
            deviance_explained: deviance_explained(fit.deviance, null_dev),
            adj_r_squared: None,
            gcv: None,
            reml: None,
            rho: None,
            log_likelihood: Some(llf),
            aic: Some(aic(llf, n_params)),
            bic: Some(bic(llf, n_params, n)),
            iterations: fit.iterations,
        },
        converged: fit.converged,
        term_contributions: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{AoBin, PreparedStorm, YearGroup};
    use approx::assert_abs_diff_eq;

    fn row(year: i32, ao: f64, max_wind: f64, ts_h: &str) -> PreparedStorm {
        PreparedStorm {
            year,
            ao,
            max_wind,
            ts_h: ts_h.to_string(),
            ao_bin: AoBin::Medium,
            year_group: YearGroup::from_year(year),
        }
    }

    fn storms() -> PreparedStorms {
        let mut rows = Vec::new();
        for (i, year) in [2005, 2010, 2015].iter().enumerate() {
            for j in 0..8 {
                let wind = 40.0 + 10.0 * j as f64;
                let ts = if j % 2 == 0 { "H" } else { "TS" };
                // multiplicative year and type effects, mild wiggle
                let ao = (1.0 + 0.1 * i as f64 + 0.002 * wind + if ts == "H" { 0.05 } else { 0.0 }).exp()
                    * (1.0 + 0.02 * ((i * 8 + j) as f64).sin());
                rows.push(row(*year, ao, wind, ts));
            }
        }
        PreparedStorms {
            rows,
            breaks: [0.0, 1.0, 2.0, 3.0],
        }
    }

    #[test]
    fn test_gamma_model_table() {
        let model = fit_storm_intensity(&storms()).unwrap();
        let names: Vec<&str> = model.coefficients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["(Intercept)", "Year2010", "Year2015", "Max_Wind", "TS_HTS"]
        );
        assert_eq!(model.fit_stats.residual_df, 24.0 - 5.0);
        assert_eq!(model.residual_kind, ResidualKind::Deviance);

        // exp(β) reported for every row and close to the generating effects
        let year2015 = &model.coefficients[2];
        assert_abs_diff_eq!(year2015.estimate, 0.2, epsilon = 0.04);
        assert_abs_diff_eq!(year2015.ratio.unwrap(), year2015.estimate.exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(model.coefficients[4].estimate, -0.05, epsilon = 0.04);

        let stats = &model.fit_stats;
        assert!(stats.deviance < stats.null_deviance);
        let k = 6.0;
        assert_abs_diff_eq!(
            stats.aic.unwrap(),
            -2.0 * stats.log_likelihood.unwrap() + 2.0 * k,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_predictions_positive() {
        let model = fit_storm_intensity(&storms()).unwrap();
        assert!(model.fitted.iter().all(|&m| m > 0.0));
    }

    #[test]
    fn test_non_positive_response_is_tagged_failure() {
        let mut s = storms();
        s.rows[3].ao = -1.0;
        match fit_storm_intensity(&s) {
            Err(AnalysisError::ModelConvergence { model, .. }) => {
                assert_eq!(model, ModelId::StormIntensity)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
