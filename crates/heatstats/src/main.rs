//! heatstats command line.
//!
//! Environment variables:
//! - `HEATSTATS_CONFIG`: path to a TOML config file
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use heatstats::AnalysisConfig;

#[derive(Parser, Debug)]
#[command(name = "heatstats")]
#[command(about = "Ocean heat content and storm intensity analysis")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides HEATSTATS_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Storm CSV (Year, AO, Max_Wind, TS_H)
    #[arg(long, value_name = "PATH")]
    storms: Option<PathBuf>,

    /// Ocean heat CSV (date, AO)
    #[arg(long, value_name = "PATH")]
    ocean_heat: Option<PathBuf>,

    /// Directory for the SVG charts
    #[arg(long, value_name = "DIR")]
    plots_dir: Option<PathBuf>,

    /// Skip chart rendering
    #[arg(long)]
    no_plots: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let (mut config, _source) =
        AnalysisConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    config.apply_overrides(args.storms, args.ocean_heat, args.plots_dir, args.no_plots);

    let report = heatstats::run(&config).context("analysis aborted")?;
    println!("{}", report.render_text());

    let failed = report.failed_models();
    if !failed.is_empty() {
        warn!(count = failed.len(), "Some models failed; see the run summary");
    }
    Ok(())
}
