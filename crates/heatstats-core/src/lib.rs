// =============================================================================
// heatstats Core Library
// =============================================================================
//
// This is the statistics engine behind the heatstats report.
// All the numerical work happens here - the report crate only loads data,
// shapes it into design matrices and prints/plots what comes back.
//
// STRUCTURE:
// ----------
// The library is organized into modules, each handling a specific concern:
//
//   - families:      Distribution families (Gaussian, Gamma)
//   - links:         Link functions (Identity, Log)
//   - splines:       Penalized B-spline and cyclic B-spline smooth bases
//   - design_matrix: Factor coding and dummy columns for categorical predictors
//   - solvers:       IRLS, penalized IRLS with GCV, AR(1) additive models
//   - inference:     Standard errors, p-values, smooth-term tests
//   - diagnostics:   Residuals, dispersion, likelihoods, ACF, QQ quantiles
//   - error:         Error types used throughout the library
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here so the report crate can reach them
//
// =============================================================================

pub mod constants;
pub mod convert;
pub mod design_matrix;
pub mod diagnostics;
pub mod error;
pub mod families;
pub mod inference;
pub mod links;
pub mod solvers;
pub mod splines;

// Re-export commonly used items at the top level for convenience
pub use design_matrix::{DesignMatrix, DesignMatrixBuilder, Factor};
pub use error::{Result, StatsError};
pub use families::{Family, GammaFamily, GaussianFamily};
pub use inference::{
    confidence_interval_t, pvalue_f, pvalue_t, pvalue_z, significance_stars, smooth_term_test,
    SmoothTermTest,
};
pub use links::{IdentityLink, Link, LogLink};
pub use solvers::{
    fit_ar1_smooth, fit_glm, fit_smooth_glm, Ar1Config, Ar1SmoothResult, IRLSConfig,
    IRLSResult, LambdaMethod, SmoothGLMConfig, SmoothGLMResult, SmoothTermData,
};
pub use splines::{BasisKind, SmoothBasis};
