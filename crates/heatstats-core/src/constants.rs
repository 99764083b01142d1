//! Numerical constants shared by the solvers.

/// Smallest fitted mean allowed for families with positive support (Gamma).
pub const MU_MIN_POSITIVE: f64 = 1e-10;

/// IRLS weights are clipped into `[min_weight, MAX_IRLS_WEIGHT]`.
pub const MAX_IRLS_WEIGHT: f64 = 1e10;

/// Tolerance used when deciding whether a quantity is zero.
pub const ZERO_TOL: f64 = 1e-10;

/// Relative eigenvalue threshold when computing the rank of a penalty matrix.
pub const RANK_TOL: f64 = 1e-9;

/// Deviance may grow by this factor before step halving kicks in.
pub const DEVIANCE_GROWTH_TOL: f64 = 1.0001;
