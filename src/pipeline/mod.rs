//! Evaluation Pipelines
//!
//! ```text
//! HOLDOUT:  units → split → fit family on training → score validation
//! TEMPORAL: history → fit family on all of it      → score later cohort
//!
//! both:     score table (+ external columns) → lift tables
//!                                            → policy comparison table
//!                                            → top-percent profit curves
//! ```
//!
//! Estimation and split failures abort the run. A score column that cannot
//! be bucketed is recorded as a `LiftFailure` and the rest of the report is
//! still produced.

mod holdout;
mod temporal;

pub use holdout::HoldoutEvaluation;
pub use temporal::TemporalValidator;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::types::{
    EvaluationMode, EvaluationReport, LiftFailure, ModelSummary, ScoreTable, Unit,
};
use crate::uplift::{
    endpoint_gaps, score_cohort, CateEstimator, CounterfactualScorer, EffectScorer, ExternalScores,
    InteractionLasso, InteractionOls, LiftEvaluator, LinearOutcomeModel, PolicyEvaluator,
    TopPercentGrid, UpliftError, TARGET_EVERYBODY, TARGET_NOBODY,
};

/// Kind recorded in model summaries for precomputed score columns.
pub const EXTERNAL_KIND: &str = "external";

/// The fit-able estimators, fitted together on one cohort.
#[derive(Debug, Clone)]
pub struct EstimatorFamily {
    ols: InteractionOls,
    lasso: InteractionLasso,
}

impl EstimatorFamily {
    pub fn new(ols: InteractionOls, lasso: InteractionLasso) -> Self {
        Self { ols, lasso }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            ols: InteractionOls::new("ols_interaction", config.estimator.rank_tolerance),
            lasso: InteractionLasso::new(
                "lasso_interaction",
                config.estimator.lasso_settings(config.experiment.seed),
            ),
        }
    }

    /// Fit OLS and lasso on the same cohort; either failure is returned.
    pub fn fit(&self, units: &[Unit]) -> Result<Vec<LinearOutcomeModel>, UpliftError> {
        let (ols, lasso) = rayon::join(|| self.ols.fit(units), || self.lasso.fit(units));
        Ok(vec![ols?, lasso?])
    }
}

impl Default for EstimatorFamily {
    fn default() -> Self {
        Self::new(InteractionOls::default(), InteractionLasso::default())
    }
}

/// Lift and policy evaluation settings applied to every score column.
pub struct Evaluators {
    pub lift: LiftEvaluator,
    pub policy: PolicyEvaluator,
    pub grid: TopPercentGrid,
}

impl Evaluators {
    pub fn from_config(config: &EngineConfig) -> Result<Self, UpliftError> {
        let grid = config.policy.top_percent_grid;
        grid.validate()?;
        Ok(Self {
            lift: LiftEvaluator::new(config.lift.num_groups, config.lift.confidence_level)?,
            policy: PolicyEvaluator::new(
                config.policy.margin,
                config.policy.cost,
                config.policy.reporting_scale,
            )?,
            grid,
        })
    }
}

/// Report plus the artifacts it was computed from.
#[derive(Debug, Clone)]
pub struct EvaluationRun {
    pub report: EvaluationReport,
    pub models: Vec<LinearOutcomeModel>,
    pub scores: ScoreTable,
}

/// Context of a run that is not derivable from the score table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunContext {
    pub mode: EvaluationMode,
    pub fit_size: usize,
    pub seed: Option<u64>,
}

/// Score `units` with fitted models and external columns, then evaluate.
pub(crate) fn score_and_evaluate(
    context: RunContext,
    models: Vec<LinearOutcomeModel>,
    units: &[Unit],
    external: &[ExternalScores],
    evaluators: &Evaluators,
) -> Result<EvaluationRun, UpliftError> {
    for scores in external {
        let covered = scores.coverage(units);
        if covered < units.len() {
            warn!(
                model = scores.name(),
                covered,
                units = units.len(),
                "External score table does not cover every scored unit"
            );
        }
    }

    let scorers: Vec<CounterfactualScorer<LinearOutcomeModel>> =
        models.into_iter().map(CounterfactualScorer::new).collect();
    let mut columns: Vec<&dyn EffectScorer> = Vec::with_capacity(scorers.len() + external.len());
    columns.extend(scorers.iter().map(|s| s as &dyn EffectScorer));
    columns.extend(external.iter().map(|s| s as &dyn EffectScorer));

    let scores = score_cohort(units, &columns)?;
    let models: Vec<LinearOutcomeModel> = scorers
        .into_iter()
        .map(CounterfactualScorer::into_model)
        .collect();

    let mut summaries: Vec<ModelSummary> = models.iter().map(summarize).collect();
    summaries.extend(external.iter().map(|s| ModelSummary {
        name: s.name().to_string(),
        kind: EXTERNAL_KIND.to_string(),
        fitted_on: 0,
        lambda_min: None,
        lambda_1se: None,
        selected_lambda: None,
    }));

    let report = evaluate_scored(context, summaries, &scores, evaluators)?;
    Ok(EvaluationRun {
        report,
        models,
        scores,
    })
}

/// Lift tables, policy table and profit curves for every column of `scores`.
pub(crate) fn evaluate_scored(
    context: RunContext,
    models: Vec<ModelSummary>,
    scores: &ScoreTable,
    evaluators: &Evaluators,
) -> Result<EvaluationReport, UpliftError> {
    let mut lift_tables = Vec::with_capacity(scores.models().len());
    let mut lift_failures = Vec::new();
    let mut profit_curves = Vec::with_capacity(scores.models().len());

    for model in scores.models() {
        match evaluators.lift.evaluate(scores, model) {
            Ok(table) => lift_tables.push(table),
            Err(e @ UpliftError::Bucketing { .. }) => {
                warn!(model = %model, error = %e, "Lift table skipped");
                lift_failures.push(LiftFailure {
                    model: model.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
        profit_curves.push(evaluators.policy.profit_curve(scores, model, &evaluators.grid)?);
    }
    let policy_table = evaluators.policy.comparison_table(scores)?;

    for row in &policy_table {
        info!(
            policy = %row.name,
            targeted_fraction = row.targeted_fraction,
            estimated_profit = row.estimated_profit,
            "Policy"
        );
    }

    let baseline = |name: &str| {
        policy_table
            .iter()
            .find(|row| row.name == name)
            .map_or(f64::NAN, |row| row.estimated_profit)
    };
    let (nobody, everybody) = (baseline(TARGET_NOBODY), baseline(TARGET_EVERYBODY));
    let estimator_gaps: Vec<_> = profit_curves
        .iter()
        .flat_map(|curve| endpoint_gaps(curve, nobody, everybody))
        .collect();
    for gap in &estimator_gaps {
        warn!(
            model = %gap.model,
            top_percent = gap.top_percent,
            matched_profit = gap.matched_profit,
            ipw_profit = gap.ipw_profit,
            "Profit curve endpoint disagrees with IPW baseline"
        );
    }

    Ok(EvaluationReport {
        generated_at: Utc::now(),
        mode: context.mode,
        fit_size: context.fit_size,
        scored_size: scores.len(),
        seed: context.seed,
        margin: evaluators.policy.margin(),
        cost: evaluators.policy.cost(),
        reporting_scale: evaluators.policy.reporting_scale(),
        models,
        lift_tables,
        lift_failures,
        policy_table,
        profit_curves,
        estimator_gaps,
    })
}

fn summarize(model: &LinearOutcomeModel) -> ModelSummary {
    ModelSummary {
        name: model.name.clone(),
        kind: model.kind.as_str().to_string(),
        fitted_on: model.fitted_on,
        lambda_min: model.penalty.map(|p| p.lambda_min),
        lambda_1se: model.penalty.map(|p| p.lambda_1se),
        selected_lambda: model.penalty.map(|p| p.selected),
    }
}

/// Log a fatal stage failure before it propagates.
pub(crate) fn log_fatal(stage: &str, err: UpliftError) -> UpliftError {
    if err.is_fatal() {
        error!(stage, error = %err, "Evaluation aborted");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Covariates;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn units(n: usize, seed: u64) -> Vec<Unit> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let x: f64 = rng.gen_range(-1.0..1.0);
                let treated = i % 2 == 0;
                let w = if treated { 1.0 } else { 0.0 };
                let y = 2.0 + x + w * (1.0 + 2.0 * x) + rng.gen_range(-0.1..0.1);
                let mut c = Covariates::new();
                c.insert("x".to_string(), x);
                Unit::new(format!("u{i}"), c, treated, y, 0.5)
            })
            .collect()
    }

    fn evaluators(groups: usize) -> Evaluators {
        Evaluators {
            lift: LiftEvaluator::new(groups, 0.95).unwrap(),
            policy: PolicyEvaluator::new(1.0, 0.5, 1000.0).unwrap(),
            grid: TopPercentGrid::default(),
        }
    }

    #[test]
    fn test_family_fits_both_estimators() {
        let models = EstimatorFamily::default().fit(&units(120, 1)).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "ols_interaction");
        assert!(models[0].penalty.is_none());
        assert_eq!(models[1].name, "lasso_interaction");
        assert!(models[1].penalty.is_some());
    }

    #[test]
    fn test_unbucketable_column_is_recorded_not_fatal() {
        let scored = units(40, 2);
        // A constant external score has one distinct value
        let flat = ExternalScores::from_pairs("flat", scored.iter().map(|u| (u.id.clone(), 1.0)));
        let models = EstimatorFamily::default().fit(&units(120, 3)).unwrap();
        let context = RunContext {
            mode: EvaluationMode::Temporal,
            fit_size: 120,
            seed: None,
        };

        let run = score_and_evaluate(context, models, &scored, &[flat], &evaluators(5)).unwrap();
        assert_eq!(run.report.lift_tables.len(), 2);
        assert_eq!(run.report.lift_failures.len(), 1);
        assert_eq!(run.report.lift_failures[0].model, "flat");
        assert_eq!(run.report.profit_curves.len(), 3);
        // three models plus two baselines
        assert_eq!(run.report.policy_table.len(), 5);
        assert_eq!(run.report.models[2].kind, EXTERNAL_KIND);
    }

    #[test]
    fn test_endpoint_gaps_recorded_for_unbalanced_cohort() {
        // 22 treated of 40 at propensity 0.5
        let mut scored = units(40, 4);
        scored[39].treated = true;
        scored[37].treated = true;
        let external =
            ExternalScores::from_pairs("ext", scored.iter().map(|u| (u.id.clone(), u.outcome)));
        let context = RunContext {
            mode: EvaluationMode::Temporal,
            fit_size: 0,
            seed: None,
        };

        let run = score_and_evaluate(context, Vec::new(), &scored, &[external], &evaluators(4))
            .unwrap();
        let gaps = &run.report.estimator_gaps;
        assert_eq!(gaps.len(), 2);
        assert!(gaps.iter().all(|g| g.model == "ext"));
        let nobody = run.report.policy(TARGET_NOBODY).unwrap().estimated_profit;
        assert_eq!(gaps[0].top_percent, 0.0);
        assert_eq!(gaps[0].ipw_profit, nobody);
        assert_ne!(gaps[0].matched_profit, nobody);
    }
}
