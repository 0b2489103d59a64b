//! Pipeline configuration
//!
//! Loaded in two tiers:
//! 1. TOML file (`synphys.toml`, or the file named by `SYNPHYS_CONFIG_PATH`)
//! 2. Environment variable overrides
//!
//! Every section has defaults, so an empty file is a valid configuration.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fit::{FitEngine, FitModel, MinimizeOptions, DEFAULT_RISE_POWER, DEFAULT_XOFFSET};
use crate::{Error, Result};

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "SYNPHYS_CONFIG_PATH";

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "synphys.toml";

/// Where morphology annotations come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologyConfig {
    /// Flat JSON export of the annotation table
    pub json_file: Option<PathBuf>,
    /// Desktop database file; takes precedence over `json_file`
    pub access_db: Option<PathBuf>,
}

/// Minimizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Maximum quasi-Newton iterations
    pub max_iterations: usize,
    /// Projected gradient tolerance
    pub gtol: f64,
    /// Relative objective reduction tolerance
    pub ftol: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        let defaults = MinimizeOptions::default();
        Self {
            max_iterations: defaults.max_iterations,
            gtol: defaults.gtol,
            ftol: defaults.ftol,
        }
    }
}

impl FitConfig {
    /// Minimizer options from this section.
    #[must_use]
    pub const fn options(&self) -> MinimizeOptions {
        MinimizeOptions {
            max_iterations: self.max_iterations,
            gtol: self.gtol,
            ftol: self.ftol,
        }
    }
}

/// PSP template settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PspConfig {
    /// Onset time of the template (seconds)
    pub xoffset: f64,
    /// Exponent of the rising phase
    pub rise_power: f64,
}

impl Default for PspConfig {
    fn default() -> Self {
        Self {
            xoffset: DEFAULT_XOFFSET,
            rise_power: DEFAULT_RISE_POWER,
        }
    }
}

impl PspConfig {
    /// PSP model with these settings.
    #[must_use]
    pub const fn model(&self) -> FitModel {
        FitModel::Psp {
            xoffset: self.xoffset,
            rise_power: self.rise_power,
        }
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Morphology source
    pub morphology: MorphologyConfig,
    /// Minimizer
    pub fit: FitConfig,
    /// PSP template
    pub psp: PspConfig,
}

impl PipelineConfig {
    /// Parse TOML text and validate it.
    ///
    /// # Errors
    ///
    /// `Error::Toml` for malformed TOML, `Error::Config` for invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// `Error::Config` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.fit.max_iterations == 0 {
            return Err(Error::Config("fit.max_iterations must be at least 1".into()));
        }
        if !is_positive(self.fit.gtol) || !is_positive(self.fit.ftol) {
            return Err(Error::Config("fit.gtol and fit.ftol must be positive".into()));
        }
        if !self.psp.xoffset.is_finite() || self.psp.xoffset < 0.0 {
            return Err(Error::Config("psp.xoffset must be a non-negative time".into()));
        }
        if !is_positive(self.psp.rise_power) {
            return Err(Error::Config("psp.rise_power must be positive".into()));
        }
        Ok(())
    }

    /// PSP fitting engine built from the `fit` and `psp` sections.
    #[must_use]
    pub fn psp_engine(&self) -> FitEngine {
        FitEngine::new(
            "minimize",
            crate::fit::FitMethod::Minimize {
                model: self.psp.model(),
                analytic_gradient: true,
            },
            self.fit.options(),
        )
    }
}

/// Find the configuration file.
///
/// Search order:
/// 1. `SYNPHYS_CONFIG_PATH` environment variable
/// 2. `./synphys.toml`
///
/// # Errors
///
/// `Error::Config` when the variable names a missing file or nothing is found.
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_VAR) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::Config(format!(
            "Config file specified by {CONFIG_PATH_VAR} not found: {}",
            path.display()
        )));
    }
    let local = env::current_dir()?.join(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(local);
    }
    Err(Error::Config(format!(
        "{CONFIG_FILE_NAME} not found at {}\nSet {CONFIG_PATH_VAR} to specify a custom location.",
        local.display()
    )))
}

/// Load configuration from a TOML file and apply environment overrides.
///
/// # Arguments
///
/// * `config_path` - Path to the file. If `None`, [`find_config_file`] is used.
///
/// # Errors
///
/// Missing file, invalid TOML, invalid override or failed validation.
pub fn load_config(config_path: Option<&Path>) -> Result<PipelineConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };
    let content = fs::read_to_string(&config_file)?;
    let mut config: PipelineConfig = toml::from_str(&content)?;
    apply_overrides(&mut config, |key| env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Apply overrides from a variable lookup.
///
/// Supported variables:
/// - `SYNPHYS_MORPHO_JSON` -> `morphology.json_file`
/// - `SYNPHYS_MORPHO_ACCESS_DB` -> `morphology.access_db`
/// - `SYNPHYS_FIT_MAX_ITER` -> `fit.max_iterations`
///
/// # Errors
///
/// `Error::Config` when a numeric override does not parse.
pub fn apply_overrides(config: &mut PipelineConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(value) = lookup("SYNPHYS_MORPHO_JSON") {
        config.morphology.json_file = Some(PathBuf::from(value));
    }
    if let Some(value) = lookup("SYNPHYS_MORPHO_ACCESS_DB") {
        config.morphology.access_db = Some(PathBuf::from(value));
    }
    if let Some(value) = lookup("SYNPHYS_FIT_MAX_ITER") {
        config.fit.max_iterations = value
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("SYNPHYS_FIT_MAX_ITER={value:?}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.fit.max_iterations, 1000);
        assert_eq!(config.psp.model(), FitModel::psp());
    }

    #[test]
    fn test_partial_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [morphology]
            json_file = "/data/morpho.json"

            [fit]
            max_iterations = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.morphology.json_file, Some(PathBuf::from("/data/morpho.json")));
        assert_eq!(config.fit.max_iterations, 50);
        assert!((config.fit.gtol - 1e-12).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            PipelineConfig::from_toml_str("[fit]\nmax_iterations = 0"),
            Err(Error::Config(_))
        ));
        assert!(PipelineConfig::from_toml_str("[fit]\ngtol = -1.0").is_err());
        assert!(PipelineConfig::from_toml_str("[psp]\nrise_power = 0.0").is_err());
        assert!(matches!(
            PipelineConfig::from_toml_str("[fit\n"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SYNPHYS_MORPHO_ACCESS_DB", "/data/morpho.accdb"),
            ("SYNPHYS_FIT_MAX_ITER", "25"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::default();
        apply_overrides(&mut config, |k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(config.fit.max_iterations, 25);
        assert_eq!(config.morphology.access_db, Some(PathBuf::from("/data/morpho.accdb")));

        let bad = |k: &str| (k == "SYNPHYS_FIT_MAX_ITER").then(|| "many".to_string());
        assert!(apply_overrides(&mut config, bad).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[psp]\nxoffset = 0.005\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert!((config.psp.xoffset - 0.005).abs() < f64::EPSILON);
        let engine = config.psp_engine();
        assert!(!engine.uses_analytic_gradient());
    }
}
