//! Engine Configuration - every tunable of an evaluation run as TOML
//!
//! Each section implements `Default`, so an empty or missing file runs with
//! the documented defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::uplift::{LassoSettings, PenaltyRule, TopPercentGrid};

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "UPLIFT_CONFIG";
/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "uplift_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$UPLIFT_CONFIG` env var
/// 2. `./uplift_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Randomization and splitting
    #[serde(default)]
    pub experiment: ExperimentConfig,

    /// Input table column names
    #[serde(default)]
    pub data: DataConfig,

    /// OLS and lasso tuning
    #[serde(default)]
    pub estimator: EstimatorConfig,

    #[serde(default)]
    pub lift: LiftConfig,

    /// Profit model and top-percent sweep
    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$UPLIFT_CONFIG` environment variable
    /// 2. `./uplift_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        for w in super::validation::suspicious_values(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Engine config saved");
        Ok(())
    }

    /// Validate every section, collecting all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let e = &self.experiment;
        check_open_unit(e.split_probability, "experiment.split_probability", &mut errors);
        if !(e.propensity > 0.0 && e.propensity <= 1.0) {
            errors.push(format!(
                "experiment.propensity = {} must be in (0, 1]",
                e.propensity
            ));
        }

        let d = &self.data;
        let named = [
            ("data.id_column", &d.id_column),
            ("data.treatment_column", &d.treatment_column),
            ("data.outcome_column", &d.outcome_column),
            ("data.propensity_column", &d.propensity_column),
            ("data.score_column", &d.score_column),
        ];
        for (key, value) in &named {
            if value.trim().is_empty() {
                errors.push(format!("{key} must not be empty"));
            }
        }
        for (i, (key_a, a)) in named.iter().enumerate() {
            for (key_b, b) in &named[i + 1..] {
                if a == b {
                    errors.push(format!("{key_a} and {key_b} both name column '{a}'"));
                }
            }
        }

        let s = &self.estimator;
        if s.cv_folds < 2 {
            errors.push(format!("estimator.cv_folds = {} must be >= 2", s.cv_folds));
        }
        if s.n_lambda == 0 {
            errors.push("estimator.n_lambda must be >= 1".to_string());
        }
        check_open_unit(s.lambda_min_ratio, "estimator.lambda_min_ratio", &mut errors);
        if s.max_iterations == 0 {
            errors.push("estimator.max_iterations must be >= 1".to_string());
        }
        check_positive(s.tolerance, "estimator.tolerance", &mut errors);
        check_open_unit(s.rank_tolerance, "estimator.rank_tolerance", &mut errors);

        if self.lift.num_groups == 0 {
            errors.push("lift.num_groups must be >= 1".to_string());
        }
        check_open_unit(self.lift.confidence_level, "lift.confidence_level", &mut errors);

        let p = &self.policy;
        if !p.margin.is_finite() {
            errors.push(format!("policy.margin = {} must be finite", p.margin));
        }
        if !p.cost.is_finite() {
            errors.push(format!("policy.cost = {} must be finite", p.cost));
        }
        check_positive(p.reporting_scale, "policy.reporting_scale", &mut errors);
        if let Err(e) = p.top_percent_grid.validate() {
            errors.push(format!("policy: {e}"));
        }

        if self.storage.path.as_os_str().is_empty() {
            errors.push("storage.path must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

fn check_open_unit(value: f64, name: &str, errors: &mut Vec<String>) {
    if !(value > 0.0 && value < 1.0) {
        errors.push(format!("{name} = {value} must be in (0, 1)"));
    }
}

fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
    if !(value > 0.0 && value.is_finite()) {
        errors.push(format!("{name} = {value} must be positive and finite"));
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Probability a unit lands in the training cohort
    pub split_probability: f64,
    /// Seed for the split and for lasso fold assignment
    pub seed: u64,
    /// Treatment probability used when the input has no propensity column
    pub propensity: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            split_probability: 0.5,
            seed: 42,
            propensity: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub id_column: String,
    pub treatment_column: String,
    pub outcome_column: String,
    /// Optional per-row propensity
    pub propensity_column: String,
    /// Score column of external score tables
    pub score_column: String,
    /// Columns that are neither covariates nor required fields
    pub exclude_columns: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            treatment_column: "treatment".to_string(),
            outcome_column: "outcome".to_string(),
            propensity_column: "propensity".to_string(),
            score_column: "tau".to_string(),
            exclude_columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub cv_folds: usize,
    pub n_lambda: usize,
    pub lambda_min_ratio: f64,
    pub penalty_rule: PenaltyRule,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Relative residual norm below which an OLS design column is dependent
    pub rank_tolerance: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        let lasso = LassoSettings::default();
        Self {
            cv_folds: lasso.cv_folds,
            n_lambda: lasso.n_lambda,
            lambda_min_ratio: lasso.lambda_min_ratio,
            penalty_rule: lasso.rule,
            max_iterations: lasso.max_iterations,
            tolerance: lasso.tolerance,
            rank_tolerance: crate::uplift::estimators::DEFAULT_RANK_TOLERANCE,
        }
    }
}

impl EstimatorConfig {
    pub fn lasso_settings(&self, seed: u64) -> LassoSettings {
        LassoSettings {
            cv_folds: self.cv_folds,
            n_lambda: self.n_lambda,
            lambda_min_ratio: self.lambda_min_ratio,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            seed,
            rule: self.penalty_rule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiftConfig {
    pub num_groups: usize,
    pub confidence_level: f64,
}

impl Default for LiftConfig {
    fn default() -> Self {
        Self {
            num_groups: crate::uplift::lift::DEFAULT_NUM_GROUPS,
            confidence_level: crate::uplift::lift::DEFAULT_CONFIDENCE_LEVEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Contribution per unit of outcome
    pub margin: f64,
    /// Cost of treating one unit
    pub cost: f64,
    /// Profit is reported per this many units of population
    pub reporting_scale: f64,
    pub top_percent_grid: TopPercentGrid,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            margin: 0.3,
            cost: 0.99,
            reporting_scale: 1000.0,
            top_percent_grid: TopPercentGrid::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Sled database directory for models and score tables
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("uplift_artifacts"),
        }
    }
}
