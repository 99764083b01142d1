// =============================================================================
// Model Diagnostics
// =============================================================================
//
// This module provides diagnostic tools for assessing model quality:
//
// - RESIDUALS: Different ways to measure prediction errors
// - DISPERSION: Estimating the scale parameter φ
// - MODEL FIT: AIC, BIC, null deviance and explained deviance
// - AUTOCORRELATION: sample ACF of residuals in time order
// - NORMALITY: theoretical normal quantiles for QQ plots
//
// These diagnostics help answer:
// - Is the model a good fit for the data?
// - Are there patterns in the residuals suggesting model misspecification?
// - Is there serial correlation left after the trend and season are removed?
//
// NAMING:
// -------
// - resid_response: Raw residuals (y - μ)
// - resid_deviance: Based on deviance contributions
//
// =============================================================================

mod acf;
mod dispersion;
mod model_fit;
mod qq;
mod residuals;

pub use residuals::{resid_deviance, resid_response};

pub use dispersion::{estimate_dispersion_pearson, pearson_chi2};

pub use model_fit::{adjusted_r_squared, aic, bic, deviance_explained, null_deviance};

pub use acf::{acf, default_max_lag, white_noise_band};

pub use qq::{normal_qq, ppoints, standardize, QQPoint};
