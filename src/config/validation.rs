//! Config validation: unknown-key detection with Levenshtein suggestions
//! and statistical sanity warnings.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::EngineConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for EngineConfig.
///
/// Any new field added to EngineConfig must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [experiment]
        "experiment",
        "experiment.split_probability",
        "experiment.seed",
        "experiment.propensity",
        // [data]
        "data",
        "data.id_column",
        "data.treatment_column",
        "data.outcome_column",
        "data.propensity_column",
        "data.score_column",
        "data.exclude_columns",
        // [estimator]
        "estimator",
        "estimator.cv_folds",
        "estimator.n_lambda",
        "estimator.lambda_min_ratio",
        "estimator.penalty_rule",
        "estimator.max_iterations",
        "estimator.tolerance",
        "estimator.rank_tolerance",
        // [lift]
        "lift",
        "lift.num_groups",
        "lift.confidence_level",
        // [policy]
        "policy",
        "policy.margin",
        "policy.cost",
        "policy.reporting_scale",
        "policy.top_percent_grid",
        "policy.top_percent_grid.start",
        "policy.top_percent_grid.stop",
        "policy.top_percent_grid.step",
        // [storage]
        "storage",
        "storage.path",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
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

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
/// Ties go to the alphabetically first key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), *k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Suspicious Values
// ============================================================================

/// Values that validate but are unlikely to be intended.
pub fn suspicious_values(config: &EngineConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |field: &str, message: String| {
        warnings.push(ValidationWarning {
            field: field.to_string(),
            message,
            suggestion: None,
        });
    };

    let split = config.experiment.split_probability;
    if !(0.1..=0.9).contains(&split) {
        warn(
            "experiment.split_probability",
            format!("experiment.split_probability = {split} leaves one cohort very small"),
        );
    }
    if config.lift.num_groups > 100 {
        warn(
            "lift.num_groups",
            format!(
                "lift.num_groups = {} will leave few units per bucket",
                config.lift.num_groups
            ),
        );
    }
    if config.estimator.cv_folds > 50 {
        warn(
            "estimator.cv_folds",
            format!("estimator.cv_folds = {} makes lasso fitting slow", config.estimator.cv_folds),
        );
    }
    if config.estimator.lambda_min_ratio > 0.1 {
        warn(
            "estimator.lambda_min_ratio",
            format!(
                "estimator.lambda_min_ratio = {} truncates the penalty path early",
                config.estimator.lambda_min_ratio
            ),
        );
    }
    if config.policy.margin <= 0.0 {
        warn(
            "policy.margin",
            format!(
                "policy.margin = {} means no unit is worth targeting",
                config.policy.margin
            ),
        );
    }

    warnings
}
