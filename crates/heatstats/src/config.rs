//! Analysis configuration loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `HEATSTATS_CONFIG` environment variable (path to TOML file)
//! 3. `heatstats.toml` in the current working directory
//! 4. Built-in defaults
//!
//! A file named by (1) or (2) must exist. Any file that is read must parse
//! and validate. Every field has a default, so a file only needs the keys it
//! changes. Unknown keys are logged as warnings and otherwise ignored.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "HEATSTATS_CONFIG";

/// Config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "heatstats.toml";

// ============================================================================
// Error Type
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),

    #[error("config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, toml::de::Error),

    #[error("config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub inputs: InputsConfig,
    pub output: OutputConfig,
    pub run: RunConfig,
    pub models: ModelsConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// The two input CSV files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub storms: PathBuf,
    pub ocean_heat: PathBuf,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            storms: PathBuf::from("data/merged_data_by_year_month.csv"),
            ocean_heat: PathBuf::from("data/ocean_heat_processed.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the SVG charts are written to.
    pub plots_dir: PathBuf,
    pub render_plots: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            plots_dir: PathBuf::from("plots"),
            render_plots: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Seed for the single RNG created at start-up.
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { seed: 123 }
    }
}

/// Basis sizes of the smooth terms and the seasonal period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub trend_k: usize,
    pub trend_seasonal_time_k: usize,
    pub trend_seasonal_month_k: usize,
    pub ar1_time_k: usize,
    pub ar1_month_k: usize,
    /// Months live on [a, b) so that December and January are neighbours.
    pub month_period: [f64; 2],
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            trend_k: 55,
            trend_seasonal_time_k: 45,
            trend_seasonal_month_k: 12,
            ar1_time_k: 45,
            ar1_month_k: 8,
            month_period: [0.5, 12.5],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Largest ACF lag; 0 selects ⌊10 log₁₀ n⌋.
    pub acf_max_lag: usize,
}

// ============================================================================
// Loading
// ============================================================================

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    WorkingDirectory(PathBuf),
    Defaults,
}

impl AnalysisConfig {
    /// Load using the standard search order. `explicit` is the `--config`
    /// flag; the environment variable is read here.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        Self::load_with(explicit, env_path, Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Search order with the environment value and local file passed in.
    pub fn load_with(
        explicit: Option<&Path>,
        env_path: Option<PathBuf>,
        local: &Path,
    ) -> Result<(Self, ConfigSource), ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded config from --config");
            return Ok((config, ConfigSource::CommandLine(path.to_path_buf())));
        }

        if let Some(path) = env_path {
            let config = Self::load_from_file(&path)?;
            info!(path = %path.display(), "Loaded config from {}", CONFIG_ENV_VAR);
            return Ok((config, ConfigSource::Environment(path)));
        }

        if local.exists() {
            let config = Self::load_from_file(local)?;
            info!(path = %local.display(), "Loaded config from working directory");
            return Ok((config, ConfigSource::WorkingDirectory(local.to_path_buf())));
        }

        info!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
        Ok((Self::default(), ConfigSource::Defaults))
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate TOML text, warning about unknown keys.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for key in unknown_keys(contents) {
            warn!(key = %key, "Unknown config key ignored");
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check basis sizes and the seasonal period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.models;
        let mut errors = Vec::new();

        for (name, k) in [
            ("models.trend_k", m.trend_k),
            ("models.trend_seasonal_time_k", m.trend_seasonal_time_k),
            ("models.trend_seasonal_month_k", m.trend_seasonal_month_k),
            ("models.ar1_time_k", m.ar1_time_k),
            ("models.ar1_month_k", m.ar1_month_k),
        ] {
            if k < 4 {
                errors.push(format!("{name} must be at least 4 (got {k})"));
            }
        }

        let [a, b] = m.month_period;
        if !(a.is_finite() && b.is_finite() && a < b) {
            errors.push(format!("models.month_period must be increasing (got [{a}, {b}])"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Apply command-line overrides on top of the loaded file.
    pub fn apply_overrides(
        &mut self,
        storms: Option<PathBuf>,
        ocean_heat: Option<PathBuf>,
        plots_dir: Option<PathBuf>,
        no_plots: bool,
    ) {
        if let Some(p) = storms {
            self.inputs.storms = p;
        }
        if let Some(p) = ocean_heat {
            self.inputs.ocean_heat = p;
        }
        if let Some(p) = plots_dir {
            self.output.plots_dir = p;
        }
        if no_plots {
            self.output.render_plots = false;
        }
    }
}

// ============================================================================
// Unknown Key Detection
// ============================================================================

fn known_config_keys() -> BTreeSet<&'static str> {
    [
        "inputs",
        "inputs.storms",
        "inputs.ocean_heat",
        "output",
        "output.plots_dir",
        "output.render_plots",
        "run",
        "run.seed",
        "models",
        "models.trend_k",
        "models.trend_seasonal_time_k",
        "models.trend_seasonal_month_k",
        "models.ar1_time_k",
        "models.ar1_month_k",
        "models.month_period",
        "diagnostics",
        "diagnostics.acf_max_lag",
    ]
    .into_iter()
    .collect()
}

/// Dotted key paths of every table entry in the document.
fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

/// Keys present in `raw_toml` that the config does not define.
pub fn unknown_keys(raw_toml: &str) -> Vec<String> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        // parse errors are reported by serde
        Err(_) => return Vec::new(),
    };
    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|k| !known.contains(k.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_report() {
        let c = AnalysisConfig::default();
        assert_eq!(c.models.trend_k, 55);
        assert_eq!(c.models.ar1_month_k, 8);
        assert_eq!(c.models.month_period, [0.5, 12.5]);
        assert_eq!(c.run.seed, 123);
        assert!(c.output.render_plots);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let c = AnalysisConfig::from_toml_str("[models]\ntrend_k = 30\n").unwrap();
        assert_eq!(c.models.trend_k, 30);
        assert_eq!(c.models.trend_seasonal_time_k, 45);
        assert_eq!(c.inputs, InputsConfig::default());
    }

    #[test]
    fn test_unknown_keys_reported() {
        let keys = unknown_keys("[models]\ntrend_kk = 3\n[extra]\nx = 1\n");
        assert_eq!(keys, vec!["extra", "extra.x", "models.trend_kk"]);
        // still loads
        assert!(AnalysisConfig::from_toml_str("[models]\ntrend_kk = 3\n").is_ok());
    }

    #[test]
    fn test_validation_rejects_small_basis_and_bad_period() {
        let err = AnalysisConfig::from_toml_str(
            "[models]\nar1_month_k = 3\nmonth_period = [12.5, 0.5]\n",
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(msgs) => assert_eq!(msgs.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_order() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("heatstats.toml");
        let missing = dir.path().join("nope.toml");

        // nothing on disk: defaults
        let (_, src) = AnalysisConfig::load_with(None, None, &local).unwrap();
        assert_eq!(src, ConfigSource::Defaults);

        let mut f = std::fs::File::create(&local).unwrap();
        writeln!(f, "[run]\nseed = 7").unwrap();
        let (c, src) = AnalysisConfig::load_with(None, None, &local).unwrap();
        assert_eq!(c.run.seed, 7);
        assert_eq!(src, ConfigSource::WorkingDirectory(local.clone()));

        // an explicitly named file must exist
        assert!(matches!(
            AnalysisConfig::load_with(Some(&missing), None, &local),
            Err(ConfigError::NotFound(_))
        ));
        assert!(matches!(
            AnalysisConfig::load_with(None, Some(missing.clone()), &local),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        assert!(matches!(
            AnalysisConfig::from_toml_str("[run]\nseed = \"x\"\n"),
            Err(ConfigError::Parse(..))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut c = AnalysisConfig::default();
        c.apply_overrides(Some("a.csv".into()), None, Some("out".into()), true);
        assert_eq!(c.inputs.storms, PathBuf::from("a.csv"));
        assert_eq!(c.output.plots_dir, PathBuf::from("out"));
        assert!(!c.output.render_plots);
    }
}
