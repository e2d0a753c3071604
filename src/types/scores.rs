//! Derived score, bucket and policy types
//!
//! Everything here is recomputable from units plus fitted models and is safe
//! to discard. Statistics that cannot be computed are stored as `f64::NAN`
//! and serialize as JSON `null`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use super::Unit;

/// Deserialize an `f64` that may have been written as `null` (NaN).
pub(crate) fn nullable_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

// ============================================================================
// Scored Units
// ============================================================================

/// A unit with one predicted treatment effect per model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredUnit {
    pub unit: Unit,
    /// Model name → predicted effect (tau)
    pub tau: BTreeMap<String, f64>,
}

impl ScoredUnit {
    pub fn tau(&self, model: &str) -> Option<f64> {
        self.tau.get(model).copied()
    }
}

/// Scores for a whole cohort, one column per model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    models: Vec<String>,
    rows: Vec<ScoredUnit>,
}

impl ScoreTable {
    pub fn new(models: Vec<String>, rows: Vec<ScoredUnit>) -> Self {
        Self { models, rows }
    }

    /// Model names in the order they were scored.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn rows(&self) -> &[ScoredUnit] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// One model's score column in row order, or the id of the first unit
    /// without a score for that model.
    pub fn column(&self, model: &str) -> Result<Vec<f64>, String> {
        self.rows
            .iter()
            .map(|r| r.tau(model).ok_or_else(|| r.unit.id.clone()))
            .collect()
    }
}

// ============================================================================
// Lift Buckets
// ============================================================================

/// Why a bucket statistic could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedStatistic {
    /// The bucket holds no treated units: effect and interval are undefined
    NoTreatedUnits,
    /// The bucket holds no control units: effect and interval are undefined
    NoControlUnits,
    /// One arm has a single unit: effect defined, standard error undefined
    SingletonArm,
}

/// One equal-frequency bucket of units ordered by a model's predicted effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreGroup {
    /// 1-based bucket index, ascending predicted effect
    pub bucket_index: usize,
    pub size: usize,
    pub treated_count: usize,
    pub control_count: usize,
    #[serde(deserialize_with = "nullable_f64")]
    pub mean_score: f64,
    /// Difference of treated and control outcome means
    #[serde(deserialize_with = "nullable_f64")]
    pub empirical_effect: f64,
    #[serde(deserialize_with = "nullable_f64")]
    pub std_error: f64,
    #[serde(deserialize_with = "nullable_f64")]
    pub ci_lower: f64,
    #[serde(deserialize_with = "nullable_f64")]
    pub ci_upper: f64,
    /// 100 × bucket effect / mean bucket effect
    #[serde(deserialize_with = "nullable_f64")]
    pub lift: f64,
    #[serde(default)]
    pub undefined: Option<UndefinedStatistic>,
}

impl ScoreGroup {
    pub fn is_defined(&self) -> bool {
        self.empirical_effect.is_finite()
    }
}

/// Lift table for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiftTable {
    pub model: String,
    pub confidence_level: f64,
    pub groups: Vec<ScoreGroup>,
}

impl LiftTable {
    pub fn undefined_count(&self) -> usize {
        self.groups.iter().filter(|g| !g.is_defined()).count()
    }
}

// ============================================================================
// Policies
// ============================================================================

/// Targeting decision for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub id: String,
    pub target: bool,
}

/// A policy evaluated on a cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub name: String,
    pub targeted_fraction: f64,
    pub estimated_profit: f64,
    pub decisions: Vec<PolicyDecision>,
}

impl PolicyOutcome {
    pub fn targeted_ids(&self) -> Vec<&str> {
        self.decisions
            .iter()
            .filter(|d| d.target)
            .map(|d| d.id.as_str())
            .collect()
    }

    pub fn row(&self) -> PolicyRow {
        PolicyRow {
            name: self.name.clone(),
            targeted_fraction: self.targeted_fraction,
            estimated_profit: self.estimated_profit,
        }
    }
}

/// One row of the policy comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRow {
    pub name: String,
    pub targeted_fraction: f64,
    #[serde(deserialize_with = "nullable_f64")]
    pub estimated_profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitCurvePoint {
    pub top_percent: f64,
    pub estimated_profit: f64,
}

/// Top-percent sweep for one model, with its profit-maximizing point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitCurve {
    pub model: String,
    pub points: Vec<ProfitCurvePoint>,
    pub best: ProfitCurvePoint,
}
