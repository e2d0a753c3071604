//! Shared data structures for treatment-effect estimation and targeting
//!
//! - Inputs: `Unit` (one experimental unit), `Cohort` (train/validation split)
//! - Scoring: `ScoredUnit`, `ScoreTable` (one tau column per model)
//! - Validation: `ScoreGroup`, `LiftTable` (quantile-bucketed lift)
//! - Targeting: `PolicyDecision`, `PolicyOutcome`, `PolicyRow`, `ProfitCurve`
//! - Reporting: `EvaluationReport`

mod unit;
mod scores;
mod report;

pub use unit::*;
pub use scores::*;
pub use report::*;
