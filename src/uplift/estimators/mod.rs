//! CATE estimator family
//!
//! Two fit-able estimators share one input contract (`CateEstimator::fit`
//! over any slice of units) and produce a `LinearOutcomeModel`:
//!
//! - `InteractionOls`: ordinary least squares on the full-interaction design
//! - `InteractionLasso`: L1-penalized fit with the penalty picked by k-fold
//!   cross-validation under a pluggable `PenaltyRule`
//!
//! `ExternalScores` wraps a precomputed per-unit effect table and plugs in at
//! the `EffectScorer` seam directly, skipping counterfactual prediction.

mod external;
mod lasso;
mod linear_model;
mod ols;

pub use external::ExternalScores;
pub use lasso::{CrossValidation, InteractionLasso, LassoSettings, PenaltyRule};
pub use linear_model::{LinearOutcomeModel, ModelKind, PenaltySelection};
pub use ols::{InteractionOls, DEFAULT_RANK_TOLERANCE};

use super::UpliftError;
use crate::types::Unit;

/// A fitted model that predicts an outcome for a unit under a chosen
/// treatment assignment.
pub trait OutcomeModel: Send + Sync {
    fn name(&self) -> &str;

    /// Predicted outcome with the unit's treatment forced to `treated`,
    /// all covariates held fixed.
    fn predict_outcome(&self, unit: &Unit, treated: bool) -> Result<f64, UpliftError>;
}

/// An estimator that fits an `OutcomeModel` on an arbitrary cohort.
pub trait CateEstimator {
    type Model: OutcomeModel;

    fn fit(&self, units: &[Unit]) -> Result<Self::Model, UpliftError>;
}

/// Anything that yields a per-unit treatment-effect score.
pub trait EffectScorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, unit: &Unit) -> Result<f64, UpliftError>;
}

/// Reject cohorts where the interaction design cannot identify an effect.
pub(crate) fn check_treatment_variation(units: &[Unit]) -> Result<(), UpliftError> {
    let treated = units.iter().filter(|u| u.treated).count();
    if treated == 0 || treated == units.len() {
        return Err(UpliftError::estimation(
            units.len(),
            format!(
                "treatment indicator has no variation ({treated} treated of {})",
                units.len()
            ),
        ));
    }
    Ok(())
}
