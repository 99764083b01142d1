// =============================================================================
// Pipeline
// =============================================================================
//
//   load → derive → { exploratory plots, models } → diagnostics → report
//
// Each stage takes the previous stage's output by reference and returns a
// new value; nothing is mutated in place. Load and derive errors abort the
// run. Model errors are recorded against their model and the run carries on.
//
// =============================================================================

use std::fmt::Write;
use std::path::PathBuf;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, warn};

use crate::config::AnalysisConfig;
use crate::data::{load_ocean_heat, load_storms};
use crate::error::Result;
use crate::features::{prepare_ocean_heat, prepare_storms, PreparedOceanHeat, PreparedStorms};
use crate::models::{
    fit_storm_intensity, fit_trend, fit_trend_seasonal, fit_trend_seasonal_ar1, FittedModel, ModelId,
};
use crate::plots;
use crate::report::{diagnose, failure_reason, format_run_summary, format_summary, ModelDiagnostics};

/// A model that fitted, with its diagnostics and text summary.
#[derive(Debug, Clone)]
pub struct ModelReport {
    pub model: FittedModel,
    pub diagnostics: ModelDiagnostics,
    pub summary: String,
}

/// Everything one run produced.
#[derive(Debug)]
pub struct RunReport {
    pub storms: PreparedStorms,
    pub ocean: PreparedOceanHeat,
    pub models: Vec<(ModelId, Result<ModelReport>)>,
    pub plots: Vec<PathBuf>,
    pub plot_failures: Vec<String>,
}

impl RunReport {
    pub fn model(&self, id: ModelId) -> Option<&ModelReport> {
        self.models
            .iter()
            .find(|(m, _)| *m == id)
            .and_then(|(_, r)| r.as_ref().ok())
    }

    pub fn failed_models(&self) -> Vec<ModelId> {
        self.models
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Model summaries followed by the run summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (_, outcome) in &self.models {
            if let Ok(report) = outcome {
                let _ = writeln!(out, "{}", report.summary);
            }
        }
        let statuses: Vec<(ModelId, std::result::Result<(), String>)> = self
            .models
            .iter()
            .map(|(id, r)| (*id, r.as_ref().map(|_| ()).map_err(failure_reason)))
            .collect();
        out.push_str(&format_run_summary(&statuses));
        if !self.plots.is_empty() || !self.plot_failures.is_empty() {
            let _ = writeln!(
                out,
                "  charts written: {}, failed: {}",
                self.plots.len(),
                self.plot_failures.len()
            );
        }
        out
    }
}

/// Load both inputs and derive their features. Any error here is fatal.
pub fn load_and_prepare(config: &AnalysisConfig) -> Result<(PreparedStorms, PreparedOceanHeat)> {
    let storm_table = load_storms(&config.inputs.storms)?;
    let ocean_table = load_ocean_heat(&config.inputs.ocean_heat)?;
    let storms = prepare_storms(&storm_table)?;
    let ocean = prepare_ocean_heat(&ocean_table);
    Ok((storms, ocean))
}

/// Fit one model.
pub fn fit_model(
    id: ModelId,
    storms: &PreparedStorms,
    ocean: &PreparedOceanHeat,
    config: &AnalysisConfig,
) -> Result<FittedModel> {
    match id {
        ModelId::TrendSpline => fit_trend(ocean, &config.models),
        ModelId::TrendSeasonal => fit_trend_seasonal(ocean, &config.models),
        ModelId::TrendSeasonalAr1 => fit_trend_seasonal_ar1(ocean, &config.models),
        ModelId::StormIntensity => fit_storm_intensity(storms),
    }
}

fn collect_plots(results: Vec<Result<PathBuf>>, plots: &mut Vec<PathBuf>, failures: &mut Vec<String>) {
    for result in results {
        match result {
            Ok(path) => plots.push(path),
            Err(e) => {
                warn!(error = %e, "Chart skipped");
                failures.push(e.to_string());
            }
        }
    }
}

/// Run the whole analysis.
pub fn run(config: &AnalysisConfig) -> Result<RunReport> {
    let (storms, ocean) = load_and_prepare(config)?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.run.seed);

    let dir = &config.output.plots_dir;
    let mut plot_paths = Vec::new();
    let mut plot_failures = Vec::new();

    let mut render = config.output.render_plots;
    if render {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(path = %dir.display(), error = %e, "Cannot create chart directory; charts disabled for this run");
            plot_failures.push(format!("chart directory {}: {e}", dir.display()));
            render = false;
        }
    }

    if render {
        collect_plots(
            plots::render_exploratory(dir, &storms, &ocean, &mut rng),
            &mut plot_paths,
            &mut plot_failures,
        );
    }

    let mut models = Vec::with_capacity(ModelId::ALL.len());
    for id in ModelId::ALL {
        info!(model = id.slug(), "Fitting {}", id.title());
        let outcome = fit_model(id, &storms, &ocean, config).map(|model| {
            let diagnostics = diagnose(&model, config.diagnostics.acf_max_lag);
            let summary = format_summary(&model, &diagnostics);
            ModelReport {
                model,
                diagnostics,
                summary,
            }
        });

        match &outcome {
            Ok(report) if render => collect_plots(
                plots::render_model(dir, &report.model, &report.diagnostics),
                &mut plot_paths,
                &mut plot_failures,
            ),
            Ok(_) => {}
            Err(e) => error!(model = id.slug(), error = %e, "Model failed; its diagnostics are skipped"),
        }
        models.push((id, outcome));
    }

    let failed = models.iter().filter(|(_, r)| r.is_err()).count();
    info!(
        models = models.len(),
        failed,
        charts = plot_paths.len(),
        "Analysis finished"
    );

    Ok(RunReport {
        storms,
        ocean,
        models,
        plots: plot_paths,
        plot_failures,
    })
}

