//! Error taxonomy for estimation, splitting and bucketing
//!
//! Undefined per-bucket statistics are not errors: they are recorded as NaN
//! with an `UndefinedStatistic` marker on the `ScoreGroup`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpliftError {
    /// Degenerate or rank-deficient design; fatal to the run
    #[error("Estimation failed on cohort of {cohort_size} units: {reason}")]
    Estimation { cohort_size: usize, reason: String },

    /// Partitioning left one cohort empty; fatal to the run
    #[error(
        "Split produced an empty cohort (training={training}, validation={validation}, seed={seed})"
    )]
    Split {
        training: usize,
        validation: usize,
        seed: u64,
    },

    #[error("Cannot form {requested} score groups from {units} units with {distinct} distinct scores")]
    Bucketing {
        requested: usize,
        distinct: usize,
        units: usize,
    },

    #[error("Unit '{unit_id}' has no covariate '{feature}'")]
    MissingCovariate { unit_id: String, feature: String },

    #[error("Model '{model}' has no score for unit '{unit_id}'")]
    MissingScore { model: String, unit_id: String },

    #[error("Invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl UpliftError {
    pub(crate) fn estimation(cohort_size: usize, reason: impl Into<String>) -> Self {
        Self::Estimation {
            cohort_size,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Estimation and split failures abort a run; everything else is
    /// reported against the table it affects.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Estimation { .. } | Self::Split { .. })
    }
}
