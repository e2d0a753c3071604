//! Uplift Engine: treatment-effect estimation and targeting-policy evaluation
//!
//! Given a randomized experiment (treatment indicator, outcome and
//! covariates per unit), the engine fits interchangeable CATE models,
//! validates their effect scores out of sample with quantile lift tables,
//! and turns scores into profit-maximizing targeting policies.
//!
//! ## Architecture
//!
//! - **uplift**: splitter, estimator family, counterfactual scorer, lift and
//!   policy evaluators
//! - **pipeline**: holdout and temporal evaluation runs
//! - **data**: CSV input and report output
//! - **storage**: Sled-backed model and score persistence
//! - **config**: TOML run configuration

pub mod config;
pub mod data;
pub mod pipeline;
pub mod storage;
pub mod types;
pub mod uplift;

// Re-export configuration
pub use config::{ConfigError, EngineConfig};

// Re-export commonly used types
pub use types::{
    Cohort, Covariates, EvaluationMode, EvaluationReport, LiftTable, PolicyOutcome, ProfitCurve,
    ScoreGroup, ScoreTable, ScoredUnit, UndefinedStatistic, Unit,
};

// Re-export the engine stages
pub use uplift::{
    score_cohort, CateEstimator, CounterfactualScorer, EffectScorer, ExternalScores,
    InteractionLasso, InteractionOls, LiftEvaluator, LinearOutcomeModel, OutcomeModel,
    PenaltyRule, PolicyEvaluator, SampleSplitter, TopPercentGrid, UpliftError,
};

// Re-export pipelines and persistence
pub use data::DataError;
pub use pipeline::{EvaluationRun, HoldoutEvaluation, TemporalValidator};
pub use storage::{ArtifactStore, StorageError};
