//! End-to-end runs over small generated CSV files.

use std::fmt::Write as _;
use std::path::Path;

use heatstats::config::{AnalysisConfig, ModelsConfig};
use heatstats::features::AoBin;
use heatstats::{AnalysisError, ModelId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Monthly ocean heat for 2005-2024 with AR(1) noise, written in reverse
/// date order.
fn write_ocean_heat(path: &Path) {
    let mut rng = ChaCha8Rng::seed_from_u64(2005);
    let mut body = String::from("date,AO\n");
    let mut e = 0.0;
    let mut rows = Vec::new();
    for year in 2005..2025 {
        for month in 1..=12u32 {
            let t = rows.len() as f64;
            e = 0.5 * e + rng.random_range(-0.5..0.5);
            let season = (2.0 * std::f64::consts::PI * f64::from(month) / 12.0).sin();
            rows.push(format!("{year}-{month:02}-01,{:.5}", 10.0 + 0.02 * t + season + e));
        }
    }
    for row in rows.iter().rev() {
        let _ = writeln!(body, "{row}");
    }
    std::fs::write(path, body).unwrap();
}

fn write_storms(path: &Path, negative_row: bool) {
    let mut body = String::from("Year,AO,Max_Wind,TS_H,Name\n");
    for (i, year) in [2005, 2012, 2021].iter().enumerate() {
        for j in 0..10 {
            let wind = 35.0 + 9.0 * j as f64;
            let ts = if j % 3 == 0 { "TS" } else { "H" };
            let mut ao = (0.5 + 0.1 * i as f64 + 0.003 * wind).exp() * (1.0 + 0.03 * ((i * 10 + j) as f64).cos());
            if negative_row && i == 0 && j == 0 {
                ao = -ao;
            }
            let _ = writeln!(body, "{year},{ao:.5},{wind},{ts},\"Storm, {j}\"");
        }
    }
    std::fs::write(path, body).unwrap();
}

fn config(dir: &Path, render_plots: bool, negative_row: bool) -> AnalysisConfig {
    let storms = dir.join("storms.csv");
    let ocean = dir.join("ocean.csv");
    write_storms(&storms, negative_row);
    write_ocean_heat(&ocean);

    let mut config = AnalysisConfig::default();
    config.inputs.storms = storms;
    config.inputs.ocean_heat = ocean;
    config.output.plots_dir = dir.join("plots");
    config.output.render_plots = render_plots;
    config
}

#[test]
fn test_full_run_writes_reports_and_charts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), true, false);
    let report = heatstats::run(&config).unwrap();

    assert_eq!(report.ocean.table.time, (1..=240).collect::<Vec<_>>());
    assert!(report.ocean.months.iter().all(|m| (1..=12).contains(m)));
    assert_eq!(report.storms.len(), 30);
    // the minimum AO always lands in Low
    let min = report
        .storms
        .rows
        .iter()
        .min_by(|a, b| a.ao.total_cmp(&b.ao))
        .unwrap();
    assert_eq!(min.ao_bin, AoBin::Low);

    assert!(report.failed_models().is_empty(), "failed: {:?}", report.failed_models());
    let storm = report.model(ModelId::StormIntensity).unwrap();
    assert!(storm.model.fitted.iter().all(|&m| m > 0.0));

    let plots = config.output.plots_dir;
    for file in [
        "ocean_heat_timeseries.svg",
        "max_wind_by_ao_bin.svg",
        "interaction_year_group_ao_bin.svg",
        "scatter_ao_max_wind.svg",
        "scatter_year_max_wind.svg",
        "ao_density.svg",
        "model1_trend_fit.svg",
        "model1_trend_acf.svg",
        "model4_storm_intensity_qq.svg",
    ] {
        assert!(plots.join(file).exists(), "missing {file}");
    }
    assert!(plots.join("model3_trend_seasonal_ar1_trend.svg").exists());
    assert!(plots.join("model3_trend_seasonal_ar1_seasonal.svg").exists());

    let text = report.render_text();
    assert!(text.contains("Run summary"));
    assert!(text.contains("Year2012"));
}

#[test]
fn test_default_bases_fit_all_models() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), false, false);
    assert_eq!(config.models, ModelsConfig::default());
    let report = heatstats::run(&config).unwrap();

    for id in ModelId::ALL {
        assert!(report.model(id).is_some(), "{id} failed: {:?}", report.failed_models());
    }

    let ks = |id: ModelId| -> Vec<(String, usize)> {
        report
            .model(id)
            .unwrap()
            .model
            .smooth_terms
            .iter()
            .map(|row| (row.name.clone(), row.k))
            .collect()
    };
    assert_eq!(ks(ModelId::TrendSpline), vec![("ps(time)".to_string(), 55)]);
    assert_eq!(
        ks(ModelId::TrendSeasonal),
        vec![("ps(time)".to_string(), 45), ("cp(months)".to_string(), 12)]
    );
    assert_eq!(
        ks(ModelId::TrendSeasonalAr1),
        vec![("ps(time)".to_string(), 45), ("cp(months)".to_string(), 8)]
    );

    // noise was generated with rho = 0.5
    let ar1 = &report.model(ModelId::TrendSeasonalAr1).unwrap().model;
    let rho = ar1.fit_stats.rho.unwrap();
    assert!(rho > 0.25 && rho < 0.85, "rho = {rho}");
    assert_eq!(ar1.residuals.len(), 240);
    assert_eq!(ar1.term_contributions.len(), 2);
}

#[test]
fn test_unwritable_chart_directory_still_fits_models() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), true, false);
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    config.output.plots_dir = blocker.join("plots");

    let report = heatstats::run(&config).unwrap();
    assert_eq!(report.models.len(), ModelId::ALL.len());
    for id in ModelId::ALL {
        assert!(report.model(id).is_some(), "{id} failed: {:?}", report.failed_models());
    }
    assert!(report.plots.is_empty());
    assert_eq!(report.plot_failures.len(), 1);
    assert!(report.plot_failures[0].contains("blocker"));
}

#[test]
fn test_reruns_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), false, false);
    let a = heatstats::run(&config).unwrap();
    let b = heatstats::run(&config).unwrap();

    assert_eq!(a.storms, b.storms);
    assert_eq!(a.ocean, b.ocean);
    for id in ModelId::ALL {
        match (a.model(id), b.model(id)) {
            // Debug text compares NaN fields as equal, unlike PartialEq
            (Some(x), Some(y)) => assert_eq!(format!("{:?}", x.model), format!("{:?}", y.model)),
            (None, None) => {}
            _ => panic!("{id} succeeded in only one run"),
        }
    }
}

#[test]
fn test_failing_model_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), false, true);
    let report = heatstats::run(&config).unwrap();

    assert!(report.failed_models().contains(&ModelId::StormIntensity));
    assert!(report.model(ModelId::TrendSpline).is_some());
    assert!(report.model(ModelId::TrendSeasonal).is_some());

    let (_, outcome) = report
        .models
        .iter()
        .find(|(id, _)| *id == ModelId::StormIntensity)
        .unwrap();
    assert!(matches!(
        outcome,
        Err(AnalysisError::ModelConvergence {
            model: ModelId::StormIntensity,
            ..
        })
    ));
    assert!(report.render_text().contains("[failed] Model 4"));
}

#[test]
fn test_missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), false, false);
    config.inputs.storms = dir.path().join("absent.csv");
    assert!(matches!(
        heatstats::run(&config),
        Err(AnalysisError::MissingFile { .. })
    ));
}
