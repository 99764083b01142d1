// =============================================================================
// Error Types
// =============================================================================
//
// Load, parse and config errors are fatal and abort the run. Model errors
// are tagged with the model that raised them so the pipeline can report the
// failure and carry on with the remaining models.
//
// =============================================================================

use std::path::PathBuf;

use heatstats_core::StatsError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::models::ModelId;

/// Errors raised by the report pipeline.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// An input path does not exist.
    #[error("input file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    /// A column is missing or a value fails to coerce.
    #[error("{}:{line}: column '{column}': {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: String,
        message: String,
    },

    /// Quantile cut points are not unique, so the bins cannot be formed.
    #[error("cannot bin '{column}': cut points {breaks:?} are not unique")]
    DegenerateBins { column: String, breaks: Vec<f64> },

    /// A model failed to fit.
    #[error("{model} did not converge: {reason}")]
    ModelConvergence { model: ModelId, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("plot '{name}' failed: {message}")]
    Plot { name: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Stats(#[from] StatsError),
}

impl AnalysisError {
    /// Tag a core error with the model it came from.
    pub fn convergence(model: ModelId, err: impl std::fmt::Display) -> Self {
        AnalysisError::ModelConvergence {
            model,
            reason: err.to_string(),
        }
    }
}

/// Result type alias for the report pipeline.
pub type Result<T> = std::result::Result<T, AnalysisError>;
