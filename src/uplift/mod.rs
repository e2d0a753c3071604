//! Treatment-effect estimation and targeting-policy evaluation
//!
//! Stages, each consuming borrowed inputs and returning new values:
//!
//! 1. `splitter`: seeded training/validation partition
//! 2. `estimators`: interaction OLS, cross-validated lasso, external scores
//! 3. `scorer`: counterfactual differencing into a `ScoreTable`
//! 4. `lift`: quantile-bucketed empirical effects per model
//! 5. `policy`: threshold (IPW) and top-percent (matched means) profit

pub mod design;
pub mod error;
pub mod estimators;
pub mod lift;
pub mod linalg;
pub mod policy;
pub mod scorer;
pub mod splitter;

pub use design::InteractionDesign;
pub use error::UpliftError;
pub use estimators::{
    CateEstimator, CrossValidation, EffectScorer, ExternalScores, InteractionLasso,
    InteractionOls, LassoSettings, LinearOutcomeModel, ModelKind, OutcomeModel, PenaltyRule,
    PenaltySelection,
};
pub use lift::{BucketEstimate, EffectStatistic, LiftEvaluator, WelchBucketStatistic};
pub use policy::{
    endpoint_gaps, PolicyEvaluator, TopPercentGrid, MAX_GRID_POINTS, TARGET_EVERYBODY, TARGET_NOBODY,
};
pub use scorer::{score_cohort, CounterfactualScorer};
pub use splitter::SampleSplitter;
