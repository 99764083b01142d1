// =============================================================================
// heatstats
// =============================================================================
//
// Ocean heat content and storm intensity report. The statistics live in
// `heatstats-core`; this crate loads the two CSV inputs, derives the
// categorical features, fits the four models, and writes summaries and
// charts.
//
//   - config:   TOML configuration and its search order
//   - data:     CSV loading
//   - features: AO_bin, Year_Group, months and exploratory summaries
//   - models:   the four model runners and their shared result type
//   - report:   residual diagnostics and text summaries
//   - plots:    SVG charts
//   - pipeline: runs everything in order
//
// =============================================================================

pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod models;
pub mod pipeline;
pub mod plots;
pub mod report;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use models::{FittedModel, ModelId};
pub use pipeline::{run, RunReport};
