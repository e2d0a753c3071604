//! Experimental units and the training/validation cohort partition

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered feature name → value mapping for one unit.
///
/// Keys iterate in lexicographic order, which fixes the column order of the
/// interaction design matrix.
pub type Covariates = BTreeMap<String, f64>;

/// One unit of a randomized experiment.
///
/// Units are read-only inputs: every stage of the engine borrows them and
/// returns new derived structures instead of mutating them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique identifier, also the join key for external score tables
    pub id: String,
    /// Numeric pre-treatment covariates
    pub covariates: Covariates,
    /// Whether the unit actually received the treatment
    pub treated: bool,
    /// Observed outcome (e.g. spend in the evaluation window)
    pub outcome: f64,
    /// Design probability of receiving treatment, in (0, 1]
    pub propensity: f64,
}

impl Unit {
    pub fn new(
        id: impl Into<String>,
        covariates: Covariates,
        treated: bool,
        outcome: f64,
        propensity: f64,
    ) -> Self {
        Self {
            id: id.into(),
            covariates,
            treated,
            outcome,
            propensity,
        }
    }

    /// Treatment indicator as a number (1.0 treated, 0.0 control).
    pub fn treatment(&self) -> f64 {
        if self.treated {
            1.0
        } else {
            0.0
        }
    }

    /// Probability of the assignment this unit actually received.
    pub fn assignment_probability(&self) -> f64 {
        if self.treated {
            self.propensity
        } else {
            1.0 - self.propensity
        }
    }

    pub fn covariate(&self, name: &str) -> Option<f64> {
        self.covariates.get(name).copied()
    }
}

/// Non-overlapping partition of a unit population.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cohort {
    pub training: Vec<Unit>,
    pub validation: Vec<Unit>,
}

impl Cohort {
    /// (training size, validation size)
    pub fn sizes(&self) -> (usize, usize) {
        (self.training.len(), self.validation.len())
    }

    pub fn total(&self) -> usize {
        self.training.len() + self.validation.len()
    }
}
