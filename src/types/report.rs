//! Evaluation report assembled by the holdout and temporal pipelines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LiftTable, PolicyRow, ProfitCurve};

/// How the scored cohort was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Seeded train/validation split of a single population
    Holdout,
    /// Fit on the full historical cohort, scored on a later cohort
    Temporal,
}

/// Summary of one model that contributed a score column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub kind: String,
    /// Number of units the model was fitted on (0 for external scores)
    pub fitted_on: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda_1se: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_lambda: Option<f64>,
}

/// A score column that could not be bucketed into a lift table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiftFailure {
    pub model: String,
    pub reason: String,
}

/// A profit-curve endpoint whose matched-mean profit differs from the
/// inverse-propensity weighted baseline with the same targeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorGap {
    pub model: String,
    /// 0 (compared with target-nobody) or 1 (compared with target-everybody)
    pub top_percent: f64,
    pub matched_profit: f64,
    pub ipw_profit: f64,
}

/// Full output of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub mode: EvaluationMode,
    pub fit_size: usize,
    pub scored_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub margin: f64,
    pub cost: f64,
    pub reporting_scale: f64,
    pub models: Vec<ModelSummary>,
    pub lift_tables: Vec<LiftTable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lift_failures: Vec<LiftFailure>,
    pub policy_table: Vec<PolicyRow>,
    pub profit_curves: Vec<ProfitCurve>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub estimator_gaps: Vec<EstimatorGap>,
}

impl EvaluationReport {
    pub fn lift_table(&self, model: &str) -> Option<&LiftTable> {
        self.lift_tables.iter().find(|t| t.model == model)
    }

    pub fn profit_curve(&self, model: &str) -> Option<&ProfitCurve> {
        self.profit_curves.iter().find(|c| c.model == model)
    }

    pub fn policy(&self, name: &str) -> Option<&PolicyRow> {
        self.policy_table.iter().find(|r| r.name == name)
    }
}
