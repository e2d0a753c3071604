//! Pipeline Integration Tests
//!
//! Synthetic randomized experiments run through the full stack: CSV loading,
//! holdout and temporal evaluation, report writing and artifact persistence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::fmt::Write as _;
use std::fs;

use uplift_engine::data::{load_external_scores, load_units, write_bundle};
use uplift_engine::storage::ArtifactStore;
use uplift_engine::types::{Covariates, EvaluationMode, Unit};
use uplift_engine::uplift::{CounterfactualScorer, EffectScorer, ExternalScores, SampleSplitter};
use uplift_engine::{EngineConfig, HoldoutEvaluation, TemporalValidator};

/// tau(x) = 1 + 3·x0; x1 only moves the baseline.
fn experiment(n: usize, seed: u64, prefix: &str) -> Vec<Unit> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    (0..n)
        .map(|i| {
            let x0: f64 = normal.sample(&mut rng);
            let x1: f64 = normal.sample(&mut rng);
            let treated = rng.gen_bool(0.5);
            let w = if treated { 1.0 } else { 0.0 };
            let y = 5.0 + 2.0 * x1 + w * (1.0 + 3.0 * x0) + 0.5 * normal.sample(&mut rng);
            let mut c = Covariates::new();
            c.insert("x0".to_string(), x0);
            c.insert("x1".to_string(), x1);
            Unit::new(format!("{prefix}{i}"), c, treated, y, 0.5)
        })
        .collect()
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.lift.num_groups = 10;
    config.estimator.cv_folds = 5;
    config.estimator.n_lambda = 40;
    config.policy.margin = 1.0;
    config.policy.cost = 1.0;
    config
}

fn to_csv(units: &[Unit]) -> String {
    let mut text = String::from("id,treatment,outcome,x0,x1\n");
    for u in units {
        writeln!(
            text,
            "{},{},{},{},{}",
            u.id,
            u8::from(u.treated),
            u.outcome,
            u.covariates["x0"],
            u.covariates["x1"]
        )
        .unwrap();
    }
    text
}

#[test]
fn split_is_deterministic_for_a_seed() {
    let units = experiment(500, 1, "u");
    let a = SampleSplitter::new(0.5, 99).unwrap().assign(&units);
    let b = SampleSplitter::new(0.5, 99).unwrap().assign(&units);
    let c = SampleSplitter::new(0.5, 100).unwrap().assign(&units);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn holdout_lift_separates_high_and_low_effect_units() {
    let units = experiment(2000, 7, "u");
    let run = HoldoutEvaluation::from_config(&config())
        .unwrap()
        .run(&units, &[])
        .unwrap();
    let report = &run.report;

    assert_eq!(report.mode, EvaluationMode::Holdout);
    assert_eq!(report.fit_size + report.scored_size, 2000);
    assert_eq!(report.models.len(), 2);
    assert!(report.models[1].lambda_1se.is_some());

    for model in ["ols_interaction", "lasso_interaction"] {
        let lift = report.lift_table(model).unwrap();
        assert_eq!(lift.groups.len(), 10);
        let sizes: Vec<usize> = lift.groups.iter().map(|g| g.size).collect();
        assert_eq!(sizes.iter().sum::<usize>(), report.scored_size);
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);

        let first = &lift.groups[0];
        let last = &lift.groups[9];
        assert!(first.mean_score < last.mean_score);
        assert!(
            last.empirical_effect > first.empirical_effect + 4.0,
            "{model}: bottom {} top {}",
            first.empirical_effect,
            last.empirical_effect
        );
    }

    // Targeting on a good score beats treating nobody or everybody
    let model_profit = report.policy("ols_interaction").unwrap().estimated_profit;
    assert!(model_profit > report.policy("target_nobody").unwrap().estimated_profit);
    assert!(model_profit > report.policy("target_everybody").unwrap().estimated_profit);
}

#[test]
fn temporal_run_from_csv_with_external_scores() {
    let dir = tempfile::tempdir().unwrap();
    let history = experiment(1200, 3, "h");
    let later = experiment(400, 4, "l");

    let history_path = dir.path().join("history.csv");
    let later_path = dir.path().join("later.csv");
    fs::write(&history_path, to_csv(&history)).unwrap();
    fs::write(&later_path, to_csv(&later)).unwrap();

    let mut scores_csv = String::from("id,tau\n");
    for u in &later {
        writeln!(scores_csv, "{},{}", u.id, 1.0 + 3.0 * u.covariates["x0"]).unwrap();
    }
    let scores_path = dir.path().join("oracle.csv");
    fs::write(&scores_path, scores_csv).unwrap();

    let config = config();
    let history_units = load_units(&history_path, &config.data, 0.5).unwrap();
    let later_units = load_units(&later_path, &config.data, 0.5).unwrap();
    assert_eq!(history_units.units.len(), 1200);
    assert_eq!(later_units.features, vec!["x0", "x1"]);
    let oracle = load_external_scores(&scores_path, "oracle", &config.data).unwrap();

    let run = TemporalValidator::from_config(&config)
        .unwrap()
        .run(&history_units.units, &later_units.units, &[oracle])
        .unwrap();
    assert_eq!(run.report.mode, EvaluationMode::Temporal);
    assert_eq!(run.report.fit_size, 1200);
    assert_eq!(run.scores.models().len(), 3);
    assert!(run.report.lift_table("oracle").is_some());
    assert!(run.report.profit_curve("oracle").is_some());

    let out = dir.path().join("report");
    let files = write_bundle(&out, &run.report, &run.scores).unwrap();
    assert_eq!(files.len(), 5);
    assert!(files.iter().all(|f| f.exists()));
    let policy_csv = fs::read_to_string(out.join("policy.csv")).unwrap();
    assert!(policy_csv.lines().any(|l| l.starts_with("oracle,")));
}

#[test]
fn stored_models_reproduce_scores_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let units = experiment(800, 11, "u");
    let run = HoldoutEvaluation::from_config(&config())
        .unwrap()
        .run(&units, &[])
        .unwrap();

    {
        let store = ArtifactStore::open(dir.path().join("artifacts")).unwrap();
        for model in &run.models {
            store.store_model("run-1", model).unwrap();
        }
        store.store_scores("run-1", &run.scores).unwrap();
    }

    let store = ArtifactStore::open(dir.path().join("artifacts")).unwrap();
    assert_eq!(store.load_scores("run-1").unwrap().as_ref(), Some(&run.scores));
    let reloaded = store.load_models("run-1").unwrap();
    assert_eq!(reloaded.len(), run.models.len());

    for model in reloaded {
        let scorer = CounterfactualScorer::new(model);
        let name = scorer.name().to_string();
        for row in run.scores.rows() {
            let tau = scorer.score(&row.unit).unwrap();
            assert_eq!(tau.to_bits(), row.tau(&name).unwrap().to_bits(), "{name} {}", row.unit.id);
        }
    }
}

#[test]
fn missing_external_score_fails_the_run() {
    let history = experiment(300, 5, "h");
    let later = experiment(60, 6, "l");
    let partial = ExternalScores::from_pairs("partial", [(later[0].id.clone(), 1.0)]);
    let err = TemporalValidator::from_config(&config())
        .unwrap()
        .run(&history, &later, &[partial])
        .unwrap_err();
    assert!(err.to_string().contains("partial"));
}
