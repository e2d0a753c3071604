//! Policy Scenario Tests
//!
//! End-to-end checks of the targeting estimators on hand-built cohorts with
//! known answers: the balanced eight-unit scenario, the top-percent boundary
//! conditions, and the constant-effect consistency check.

use std::collections::BTreeMap;

use uplift_engine::types::{Covariates, ScoreTable, ScoredUnit, Unit};
use uplift_engine::uplift::{LiftEvaluator, PolicyEvaluator, TopPercentGrid, TARGET_EVERYBODY, TARGET_NOBODY};

const TOL: f64 = 1e-9;

fn table(model: &str, entries: &[(f64, bool, f64, f64)]) -> ScoreTable {
    let rows = entries
        .iter()
        .enumerate()
        .map(|(i, &(tau, treated, outcome, propensity))| ScoredUnit {
            unit: Unit::new(format!("unit-{i}"), Covariates::new(), treated, outcome, propensity),
            tau: BTreeMap::from([(model.to_string(), tau)]),
        })
        .collect();
    ScoreTable::new(vec![model.to_string()], rows)
}

/// Four high-effect units (tau = 5) and four low-effect units (tau = −5).
/// Controls earn 10; treated high-effect units earn 15, treated low-effect
/// units earn 5.
fn eight_unit_scenario() -> ScoreTable {
    table(
        "model",
        &[
            (5.0, true, 15.0, 0.5),
            (5.0, false, 10.0, 0.5),
            (5.0, true, 15.0, 0.5),
            (5.0, false, 10.0, 0.5),
            (-5.0, true, 5.0, 0.5),
            (-5.0, false, 10.0, 0.5),
            (-5.0, true, 5.0, 0.5),
            (-5.0, false, 10.0, 0.5),
        ],
    )
}

// ============================================================================
// Eight-Unit Scenario
// ============================================================================

#[test]
fn threshold_policy_targets_exactly_the_high_effect_units() {
    let evaluator = PolicyEvaluator::new(2.0, 1.0, 1000.0).unwrap();
    let policy = evaluator.threshold_policy(&eight_unit_scenario(), "model").unwrap();
    assert_eq!(policy.targeted_ids(), vec!["unit-0", "unit-1", "unit-2", "unit-3"]);
}

#[test]
fn top_half_selects_same_units_with_matching_profit() {
    let scores = eight_unit_scenario();
    let evaluator = PolicyEvaluator::new(2.0, 1.0, 1000.0).unwrap();

    let threshold = evaluator.threshold_policy(&scores, "model").unwrap();
    let top_half = evaluator.top_percent_policy(&scores, "model", 0.5).unwrap();

    assert_eq!(top_half.targeted_ids(), threshold.targeted_ids());
    assert!(
        (top_half.estimated_profit - threshold.estimated_profit).abs() < TOL,
        "top-percent {} vs threshold {}",
        top_half.estimated_profit,
        threshold.estimated_profit
    );
    assert!((threshold.estimated_profit - 24_500.0).abs() < TOL);
}

#[test]
fn profit_curve_peaks_at_the_high_effect_half() {
    let evaluator = PolicyEvaluator::new(2.0, 1.0, 1000.0).unwrap();
    let curve = evaluator
        .profit_curve(&eight_unit_scenario(), "model", &TopPercentGrid::default())
        .unwrap();
    assert_eq!(curve.points.len(), 101);
    // round(p · 8) = 4 first at p = 0.44
    assert!((curve.best.top_percent - 0.44).abs() < 1e-9);
    assert!((curve.best.estimated_profit - 24_500.0).abs() < TOL);
}

// ============================================================================
// Boundary Conditions
// ============================================================================

#[test]
fn top_percent_endpoints_equal_baselines_on_balanced_assignment() {
    // Propensity 0.5 and exactly half treated: both estimators weight
    // every matched unit identically at the endpoints.
    let scores = table(
        "m",
        &[
            (0.3, true, 4.0, 0.5),
            (-1.2, false, 2.5, 0.5),
            (2.0, true, 9.0, 0.5),
            (0.7, false, 3.0, 0.5),
            (1.1, false, 6.5, 0.5),
            (-0.4, true, 1.0, 0.5),
        ],
    );
    let evaluator = PolicyEvaluator::new(0.3, 0.99, 1000.0).unwrap();

    let nobody = evaluator.target_nobody(&scores).unwrap();
    let everybody = evaluator.target_everybody(&scores).unwrap();
    let at_zero = evaluator.top_percent_policy(&scores, "m", 0.0).unwrap();
    let at_one = evaluator.top_percent_policy(&scores, "m", 1.0).unwrap();

    assert_eq!(nobody.name, TARGET_NOBODY);
    assert_eq!(everybody.name, TARGET_EVERYBODY);
    assert!(at_zero.targeted_ids().is_empty());
    assert_eq!(at_one.targeted_ids().len(), 6);
    assert!((at_zero.estimated_profit - nobody.estimated_profit).abs() < TOL);
    assert!((at_one.estimated_profit - everybody.estimated_profit).abs() < TOL);
}

#[test]
fn baselines_ignore_scores() {
    let evaluator = PolicyEvaluator::new(1.0, 0.5, 100.0).unwrap();
    let a = table("m", &[(9.0, true, 3.0, 0.5), (-9.0, false, 1.0, 0.5)]);
    let b = table("m", &[(-9.0, true, 3.0, 0.5), (9.0, false, 1.0, 0.5)]);
    assert_eq!(
        evaluator.target_everybody(&a).unwrap().estimated_profit,
        evaluator.target_everybody(&b).unwrap().estimated_profit
    );
    assert_eq!(
        evaluator.target_nobody(&a).unwrap().estimated_profit,
        evaluator.target_nobody(&b).unwrap().estimated_profit
    );
}

// ============================================================================
// Constant-Effect Consistency
// ============================================================================

#[test]
fn constant_profitable_effect_targets_everyone_at_scale_times_mean() {
    // Every unit treated with certainty, constant effect 4, m·τ = 2 > c = 0.5
    let (margin, cost, scale) = (0.5, 0.5, 1000.0);
    let outcomes = [12.0, 7.5, 9.0, 14.25, 11.0];
    let entries: Vec<(f64, bool, f64, f64)> =
        outcomes.iter().map(|&y| (4.0, true, y, 1.0)).collect();
    let scores = table("m", &entries);

    let policy = PolicyEvaluator::new(margin, cost, scale)
        .unwrap()
        .threshold_policy(&scores, "m")
        .unwrap();

    assert_eq!(policy.targeted_fraction, 1.0);
    let expected = scale * outcomes.iter().map(|y| margin * y - cost).sum::<f64>()
        / outcomes.len() as f64;
    assert!((policy.estimated_profit - expected).abs() < TOL);
}

#[test]
fn randomized_assignment_reweights_treated_units_by_inverse_propensity() {
    // Half treated at propensity 0.5, constant effect 4, m·τ = 2 > c = 0.5
    let (margin, cost, scale, propensity) = (0.5, 0.5, 1000.0, 0.5);
    let entries = [
        (4.0, true, 12.0, propensity),
        (4.0, false, 8.0, propensity),
        (4.0, true, 7.5, propensity),
        (4.0, false, 3.5, propensity),
        (4.0, true, 14.25, propensity),
        (4.0, false, 10.25, propensity),
    ];
    let scores = table("m", &entries);
    let evaluator = PolicyEvaluator::new(margin, cost, scale).unwrap();

    let policy = evaluator.threshold_policy(&scores, "m").unwrap();
    let everybody = evaluator.target_everybody(&scores).unwrap();
    assert_eq!(policy.targeted_fraction, 1.0);

    let treated_sum: f64 = entries
        .iter()
        .filter(|e| e.1)
        .map(|&(_, _, y, e)| (margin * y - cost) / e)
        .sum();
    let expected = scale * treated_sum / entries.len() as f64;
    assert!((policy.estimated_profit - expected).abs() < TOL);
    assert!((everybody.estimated_profit - expected).abs() < TOL);
    // Reweighting doubles each treated contribution: 1000 · (2 · 15.375) / 6
    assert!((expected - 5125.0).abs() < TOL);
}

#[test]
fn ipw_and_matched_estimators_diverge_on_unbalanced_assignment() {
    // Three treated, one control: the estimators are not required to agree
    let scores = table(
        "m",
        &[
            (1.0, true, 10.0, 0.5),
            (1.0, true, 12.0, 0.5),
            (-1.0, true, 4.0, 0.5),
            (-1.0, false, 6.0, 0.5),
        ],
    );
    let evaluator = PolicyEvaluator::new(1.0, 0.5, 1.0).unwrap();
    let threshold = evaluator.threshold_policy(&scores, "m").unwrap();
    let top = evaluator.top_percent_policy(&scores, "m", 0.5).unwrap();
    assert_eq!(threshold.targeted_ids(), top.targeted_ids());
    // IPW: ((9.5 + 11.5) / 0.5 + 6 / 0.5) / 4 = 13.5
    assert!((threshold.estimated_profit - 13.5).abs() < TOL);
    // matched: (2 · 10.5 + 2 · 6) / 4 = 8.25
    assert!((top.estimated_profit - 8.25).abs() < TOL);
}

// ============================================================================
// Undefined Lift Buckets
// ============================================================================

#[test]
fn treated_only_bucket_is_reported_as_undefined() {
    let scores = table(
        "m",
        &[
            (0.1, true, 1.0, 0.5),
            (0.2, true, 2.0, 0.5),
            (0.3, true, 3.0, 0.5),
            (0.4, true, 4.0, 0.5),
            (0.5, true, 5.0, 0.5),
            (0.6, false, 1.0, 0.5),
            (0.7, true, 8.0, 0.5),
            (0.8, false, 2.0, 0.5),
        ],
    );
    let lift = LiftEvaluator::new(2, 0.95).unwrap().evaluate(&scores, "m").unwrap();
    let low = &lift.groups[0];
    assert_eq!(low.control_count, 0);
    assert!(low.empirical_effect.is_nan());
    assert!(low.ci_lower.is_nan());
    assert!(low.ci_upper.is_nan());
    assert!(low.lift.is_nan());
    assert!(lift.groups[1].empirical_effect.is_finite());
}
