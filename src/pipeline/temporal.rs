//! Temporal validation: fit on the whole history, evaluate on a later,
//! disjoint cohort. External score columns for the later cohort are passed
//! through as supplied.

use std::collections::HashSet;
use tracing::info;

use super::{log_fatal, score_and_evaluate, EstimatorFamily, EvaluationRun, Evaluators, RunContext};
use crate::config::EngineConfig;
use crate::types::{EvaluationMode, Unit};
use crate::uplift::{ExternalScores, UpliftError};

pub struct TemporalValidator {
    family: EstimatorFamily,
    evaluators: Evaluators,
}

impl TemporalValidator {
    pub fn new(family: EstimatorFamily, evaluators: Evaluators) -> Self {
        Self { family, evaluators }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, UpliftError> {
        Ok(Self::new(
            EstimatorFamily::from_config(config),
            Evaluators::from_config(config)?,
        ))
    }

    pub fn run(
        &self,
        history: &[Unit],
        later: &[Unit],
        external: &[ExternalScores],
    ) -> Result<EvaluationRun, UpliftError> {
        if later.is_empty() {
            return Err(UpliftError::invalid("later cohort", "no units to score"));
        }
        let history_ids: HashSet<&str> = history.iter().map(|u| u.id.as_str()).collect();
        if let Some(shared) = later.iter().find(|u| history_ids.contains(u.id.as_str())) {
            return Err(UpliftError::invalid(
                "later cohort",
                format!("unit '{}' also appears in the history", shared.id),
            ));
        }
        info!(
            history = history.len(),
            later = later.len(),
            external = external.len(),
            "Temporal validation"
        );

        let models = self.family.fit(history).map_err(|e| log_fatal("fit", e))?;
        let context = RunContext {
            mode: EvaluationMode::Temporal,
            fit_size: history.len(),
            seed: None,
        };
        score_and_evaluate(context, models, later, external, &self.evaluators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Covariates;
    use crate::uplift::{LiftEvaluator, PolicyEvaluator, TopPercentGrid};

    fn cohort(prefix: &str, offset: usize, n: usize) -> Vec<Unit> {
        (offset..offset + n)
            .map(|i| {
                let x = (i % 13) as f64 / 13.0;
                let treated = i % 2 == 1;
                let w = if treated { 1.0 } else { 0.0 };
                let mut c = Covariates::new();
                c.insert("x".to_string(), x);
                Unit::new(format!("{prefix}{i}"), c, treated, 3.0 + x + w * 4.0 * x, 0.5)
            })
            .collect()
    }

    fn validator() -> TemporalValidator {
        TemporalValidator::new(
            EstimatorFamily::default(),
            Evaluators {
                lift: LiftEvaluator::new(4, 0.95).unwrap(),
                policy: PolicyEvaluator::new(1.0, 1.0, 1000.0).unwrap(),
                grid: TopPercentGrid::default(),
            },
        )
    }

    #[test]
    fn test_external_column_passes_through() {
        let history = cohort("h", 0, 120);
        let later = cohort("l", 1000, 52);
        let external = ExternalScores::from_pairs(
            "forest",
            later.iter().map(|u| (u.id.clone(), 4.0 * u.covariate("x").unwrap_or(0.0))),
        );

        let run = validator().run(&history, &later, &[external]).unwrap();
        assert_eq!(run.report.mode, EvaluationMode::Temporal);
        assert_eq!(run.report.fit_size, 120);
        assert_eq!(run.report.scored_size, 52);
        assert_eq!(run.report.seed, None);
        assert_eq!(run.models.len(), 2);
        assert_eq!(
            run.scores.rows()[0].tau("forest"),
            Some(4.0 * later[0].covariate("x").unwrap())
        );
        assert!(run.report.lift_table("forest").is_some());
    }

    #[test]
    fn test_overlapping_cohorts_rejected() {
        let history = cohort("u", 0, 60);
        let later = cohort("u", 50, 20);
        assert!(matches!(
            validator().run(&history, &later, &[]),
            Err(UpliftError::InvalidParameter { .. })
        ));
    }
}
