// =============================================================================
// Error Types
// =============================================================================
//
// Every fallible function in the core library returns `Result<T>`, which is
// `std::result::Result<T, StatsError>`. The report crate wraps these errors
// and tags them with the model that produced them.
// =============================================================================

use thiserror::Error;

/// Errors raised by the statistics engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    /// Two inputs that must line up (rows of X and length of y, etc.) do not.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// An input had no observations or no columns.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// A value is outside the domain the method accepts
    /// (e.g. a non-positive response for the Gamma family).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A decomposition or solve failed, usually because a matrix is singular.
    #[error("linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// An iterative procedure ran out of iterations or produced a
    /// non-finite objective.
    #[error("failed to converge: {0}")]
    ConvergenceFailure(String),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, StatsError>;
