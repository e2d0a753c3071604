//! Holdout evaluation: split one population, fit on training, evaluate on
//! validation.

use tracing::info;

use super::{log_fatal, score_and_evaluate, EstimatorFamily, EvaluationRun, Evaluators, RunContext};
use crate::config::EngineConfig;
use crate::types::{EvaluationMode, Unit};
use crate::uplift::{ExternalScores, SampleSplitter, UpliftError};

pub struct HoldoutEvaluation {
    splitter: SampleSplitter,
    family: EstimatorFamily,
    evaluators: Evaluators,
}

impl HoldoutEvaluation {
    pub fn new(splitter: SampleSplitter, family: EstimatorFamily, evaluators: Evaluators) -> Self {
        Self {
            splitter,
            family,
            evaluators,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, UpliftError> {
        Ok(Self::new(
            SampleSplitter::new(config.experiment.split_probability, config.experiment.seed)?,
            EstimatorFamily::from_config(config),
            Evaluators::from_config(config)?,
        ))
    }

    /// External score tables, when given, are evaluated on the validation
    /// cohort next to the fitted models.
    pub fn run(
        &self,
        units: &[Unit],
        external: &[ExternalScores],
    ) -> Result<EvaluationRun, UpliftError> {
        let cohort = self
            .splitter
            .split(units)
            .map_err(|e| log_fatal("split", e))?;
        let (training, validation) = cohort.sizes();
        info!(
            training,
            validation,
            seed = self.splitter.seed(),
            "Holdout split"
        );

        let models = self
            .family
            .fit(&cohort.training)
            .map_err(|e| log_fatal("fit", e))?;

        let context = RunContext {
            mode: EvaluationMode::Holdout,
            fit_size: training,
            seed: Some(self.splitter.seed()),
        };
        score_and_evaluate(
            context,
            models,
            &cohort.validation,
            external,
            &self.evaluators,
        )
    }
}
