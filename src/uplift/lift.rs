//! Quantile-bucketed lift evaluation
//!
//! Units are sorted by one model's predicted effect (ascending, ties kept in
//! unit order) and cut into `G` equal-frequency buckets; the first `n mod G`
//! buckets receive one extra unit. Within each bucket the empirical effect
//! is the treated-minus-control outcome mean difference, which needs no
//! reweighting because assignment is fully randomized with constant
//! propensity.
//!
//! The per-bucket statistic is swappable through `EffectStatistic`. The
//! default `WelchBucketStatistic` uses a Welch standard error with a
//! t interval on `bucket size − 1` degrees of freedom.

use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{debug, warn};

use super::linalg::{mean, sample_variance};
use super::UpliftError;
use crate::types::{LiftTable, ScoreGroup, ScoreTable, UndefinedStatistic};

pub const DEFAULT_NUM_GROUPS: usize = 20;
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Effect estimate and interval for one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketEstimate {
    pub effect: f64,
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub undefined: Option<UndefinedStatistic>,
}

impl BucketEstimate {
    fn undefined(reason: UndefinedStatistic) -> Self {
        Self {
            effect: f64::NAN,
            std_error: f64::NAN,
            ci_lower: f64::NAN,
            ci_upper: f64::NAN,
            undefined: Some(reason),
        }
    }
}

/// Per-bucket effect statistic.
pub trait EffectStatistic: Send + Sync {
    fn estimate(&self, treated: &[f64], control: &[f64], confidence_level: f64) -> BucketEstimate;
}

/// Difference in means, Welch standard error, t interval with
/// `df = bucket size − 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WelchBucketStatistic;

impl EffectStatistic for WelchBucketStatistic {
    fn estimate(&self, treated: &[f64], control: &[f64], confidence_level: f64) -> BucketEstimate {
        if treated.is_empty() {
            return BucketEstimate::undefined(UndefinedStatistic::NoTreatedUnits);
        }
        if control.is_empty() {
            return BucketEstimate::undefined(UndefinedStatistic::NoControlUnits);
        }

        let effect = mean(treated) - mean(control);
        let std_error = (sample_variance(treated) / treated.len() as f64
            + sample_variance(control) / control.len() as f64)
            .sqrt();
        if !std_error.is_finite() {
            return BucketEstimate {
                effect,
                std_error: f64::NAN,
                ci_lower: f64::NAN,
                ci_upper: f64::NAN,
                undefined: Some(UndefinedStatistic::SingletonArm),
            };
        }

        let df = (treated.len() + control.len()) as f64 - 1.0;
        let margin = t_critical(df, confidence_level) * std_error;
        BucketEstimate {
            effect,
            std_error,
            ci_lower: effect - margin,
            ci_upper: effect + margin,
            undefined: None,
        }
    }
}

/// Two-sided critical value of Student's t; NaN when undefined.
pub fn t_critical(df: f64, confidence_level: f64) -> f64 {
    if df < 1.0 {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(t) => t.inverse_cdf(1.0 - (1.0 - confidence_level) / 2.0),
        Err(_) => f64::NAN,
    }
}

pub struct LiftEvaluator {
    num_groups: usize,
    confidence_level: f64,
    statistic: Box<dyn EffectStatistic>,
}

impl LiftEvaluator {
    pub fn new(num_groups: usize, confidence_level: f64) -> Result<Self, UpliftError> {
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(UpliftError::invalid(
                "confidence_level",
                format!("{confidence_level} is outside (0, 1)"),
            ));
        }
        Ok(Self {
            num_groups,
            confidence_level,
            statistic: Box::new(WelchBucketStatistic),
        })
    }

    #[must_use]
    pub fn with_statistic(mut self, statistic: Box<dyn EffectStatistic>) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Row indices of each bucket, buckets in ascending score order.
    pub fn bucket_members(&self, scores: &[f64]) -> Result<Vec<Vec<usize>>, UpliftError> {
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(UpliftError::invalid(
                "score",
                format!("cannot bucket non-finite score {bad}"),
            ));
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

        let mut distinct = 0usize;
        let mut previous: Option<f64> = None;
        for &i in &order {
            if previous != Some(scores[i]) {
                distinct += 1;
                previous = Some(scores[i]);
            }
        }

        let n = scores.len();
        let g = self.num_groups;
        if g == 0 || distinct < g {
            return Err(UpliftError::Bucketing {
                requested: g,
                distinct,
                units: n,
            });
        }

        let (base, extra) = (n / g, n % g);
        let mut members = Vec::with_capacity(g);
        let mut start = 0;
        for bucket in 0..g {
            let size = base + usize::from(bucket < extra);
            members.push(order[start..start + size].to_vec());
            start += size;
        }
        Ok(members)
    }

    /// Lift table for one model's score column.
    pub fn evaluate(&self, table: &ScoreTable, model: &str) -> Result<LiftTable, UpliftError> {
        let scores = table
            .column(model)
            .map_err(|unit_id| UpliftError::MissingScore {
                model: model.to_string(),
                unit_id,
            })?;
        let members = self.bucket_members(&scores)?;
        let rows = table.rows();

        let mut groups: Vec<ScoreGroup> = members
            .iter()
            .enumerate()
            .map(|(b, indices)| {
                let (treated, control): (Vec<usize>, Vec<usize>) =
                    indices.iter().partition(|&&i| rows[i].unit.treated);
                let treated_y: Vec<f64> = treated.iter().map(|&i| rows[i].unit.outcome).collect();
                let control_y: Vec<f64> = control.iter().map(|&i| rows[i].unit.outcome).collect();
                let bucket_scores: Vec<f64> = indices.iter().map(|&i| scores[i]).collect();

                let estimate =
                    self.statistic
                        .estimate(&treated_y, &control_y, self.confidence_level);

                ScoreGroup {
                    bucket_index: b + 1,
                    size: indices.len(),
                    treated_count: treated.len(),
                    control_count: control.len(),
                    mean_score: mean(&bucket_scores),
                    empirical_effect: estimate.effect,
                    std_error: estimate.std_error,
                    ci_lower: estimate.ci_lower,
                    ci_upper: estimate.ci_upper,
                    lift: f64::NAN,
                    undefined: estimate.undefined,
                }
            })
            .collect();

        let defined: Vec<f64> = groups
            .iter()
            .map(|g| g.empirical_effect)
            .filter(|e| e.is_finite())
            .collect();
        let average_effect = mean(&defined);
        if average_effect.is_finite() && average_effect != 0.0 {
            for group in groups.iter_mut().filter(|g| g.is_defined()) {
                group.lift = 100.0 * group.empirical_effect / average_effect;
            }
        }

        let undefined = groups.iter().filter(|g| !g.is_defined()).count();
        if undefined > 0 {
            warn!(
                model,
                undefined,
                groups = groups.len(),
                "Lift buckets without both treated and control units"
            );
        }
        debug!(model, groups = groups.len(), average_effect, "Lift table built");

        Ok(LiftTable {
            model: model.to_string(),
            confidence_level: self.confidence_level,
            groups,
        })
    }
}

impl Default for LiftEvaluator {
    fn default() -> Self {
        Self {
            num_groups: DEFAULT_NUM_GROUPS,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            statistic: Box::new(WelchBucketStatistic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Covariates, ScoredUnit, Unit};
    use std::collections::BTreeMap;

    fn table(entries: &[(f64, bool, f64)]) -> ScoreTable {
        let rows = entries
            .iter()
            .enumerate()
            .map(|(i, (tau, treated, y))| ScoredUnit {
                unit: Unit::new(format!("u{i}"), Covariates::new(), *treated, *y, 0.5),
                tau: BTreeMap::from([("m".to_string(), *tau)]),
            })
            .collect();
        ScoreTable::new(vec!["m".to_string()], rows)
    }

    #[test]
    fn test_buckets_cover_every_unit_once() {
        let scores: Vec<f64> = (0..103).map(|i| ((i * 37) % 101) as f64 * 0.1).collect();
        let evaluator = LiftEvaluator::new(20, 0.95).unwrap();
        let members = evaluator.bucket_members(&scores).unwrap();

        assert_eq!(members.len(), 20);
        let mut seen: Vec<usize> = members.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..103).collect::<Vec<_>>());

        let sizes: Vec<usize> = members.iter().map(Vec::len).collect();
        let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
        assert!(max - min <= 1);
        // 103 = 20 × 5 + 3: the first three buckets take the extra unit
        assert_eq!(&sizes[..4], &[6, 6, 6, 5]);
    }

    #[test]
    fn test_buckets_ascend_by_score_with_stable_ties() {
        let scores = [3.0, 1.0, 2.0, 1.0, 3.0, 2.0];
        let evaluator = LiftEvaluator::new(3, 0.95).unwrap();
        let members = evaluator.bucket_members(&scores).unwrap();
        assert_eq!(members, vec![vec![1, 3], vec![2, 5], vec![0, 4]]);
    }

    #[test]
    fn test_too_few_distinct_scores() {
        let evaluator = LiftEvaluator::new(4, 0.95).unwrap();
        assert_eq!(
            evaluator.bucket_members(&[1.0, 1.0, 2.0, 2.0, 3.0]),
            Err(UpliftError::Bucketing {
                requested: 4,
                distinct: 3,
                units: 5
            })
        );
        let none = LiftEvaluator::new(0, 0.95).unwrap();
        assert!(none.bucket_members(&[1.0]).is_err());
    }

    #[test]
    fn test_bucket_effect_and_interval() {
        // Bucket 1: treated {4, 6}, control {1, 3} → effect 3
        // Bucket 2: treated {10, 12}, control {2, 4} → effect 8
        let t = table(&[
            (0.1, true, 4.0),
            (0.2, true, 6.0),
            (0.3, false, 1.0),
            (0.4, false, 3.0),
            (0.5, true, 10.0),
            (0.6, true, 12.0),
            (0.7, false, 2.0),
            (0.8, false, 4.0),
        ]);
        let lift = LiftEvaluator::new(2, 0.95).unwrap().evaluate(&t, "m").unwrap();
        let g = &lift.groups;
        assert_eq!(g.len(), 2);
        assert!((g[0].empirical_effect - 3.0).abs() < 1e-12);
        assert!((g[1].empirical_effect - 8.0).abs() < 1e-12);
        assert!((g[0].mean_score - 0.25).abs() < 1e-12);

        // Var = 2 in every arm → SE = sqrt(2/2 + 2/2)
        let se = 2.0_f64.sqrt();
        assert!((g[0].std_error - se).abs() < 1e-12);
        // df = 3, t(0.975, 3) = 3.182446
        assert!((g[0].ci_upper - (3.0 + 3.182_446 * se)).abs() < 1e-4);
        assert!((g[0].ci_lower - (3.0 - 3.182_446 * se)).abs() < 1e-4);

        // mean effect 5.5 → lifts 54.5 and 145.5
        assert!((g[0].lift - 300.0 / 5.5).abs() < 1e-9);
        assert!((g[1].lift - 800.0 / 5.5).abs() < 1e-9);
        assert_eq!(g[0].bucket_index, 1);
    }

    #[test]
    fn test_only_treated_bucket_is_undefined_not_zero() {
        let t = table(&[
            (0.1, true, 4.0),
            (0.2, true, 6.0),
            (0.3, true, 5.0),
            (0.5, true, 10.0),
            (0.6, false, 2.0),
            (0.7, true, 12.0),
            (0.8, false, 4.0),
        ]);
        let lift = LiftEvaluator::new(2, 0.95).unwrap().evaluate(&t, "m").unwrap();
        let first = &lift.groups[0];
        assert_eq!(first.control_count, 0);
        assert!(first.empirical_effect.is_nan());
        assert!(first.ci_lower.is_nan() && first.ci_upper.is_nan());
        assert!(first.lift.is_nan());
        assert_eq!(first.undefined, Some(UndefinedStatistic::NoControlUnits));

        // The other bucket stays defined and carries the whole average
        let second = &lift.groups[1];
        assert!(second.is_defined());
        assert!((second.lift - 100.0).abs() < 1e-9);
        assert_eq!(lift.undefined_count(), 1);
    }

    #[test]
    fn test_singleton_arm_has_effect_without_interval() {
        let estimate = WelchBucketStatistic.estimate(&[5.0], &[1.0, 3.0], 0.95);
        assert!((estimate.effect - 3.0).abs() < 1e-12);
        assert!(estimate.std_error.is_nan());
        assert_eq!(estimate.undefined, Some(UndefinedStatistic::SingletonArm));
    }

    struct ZeroStatistic;

    impl EffectStatistic for ZeroStatistic {
        fn estimate(&self, _: &[f64], _: &[f64], _: f64) -> BucketEstimate {
            BucketEstimate {
                effect: 1.0,
                std_error: 0.0,
                ci_lower: 1.0,
                ci_upper: 1.0,
                undefined: None,
            }
        }
    }

    #[test]
    fn test_statistic_is_swappable() {
        let t = table(&[(0.1, true, 4.0), (0.2, false, 6.0)]);
        let lift = LiftEvaluator::new(2, 0.9)
            .unwrap()
            .with_statistic(Box::new(ZeroStatistic))
            .evaluate(&t, "m")
            .unwrap();
        assert!(lift.groups.iter().all(|g| g.empirical_effect == 1.0));
        assert!(lift.groups.iter().all(|g| (g.lift - 100.0).abs() < 1e-12));
    }

    #[test]
    fn test_t_critical_values() {
        assert!((t_critical(3.0, 0.95) - 3.182_446).abs() < 1e-4);
        assert!((t_critical(1e6, 0.95) - 1.959_964).abs() < 1e-3);
        assert!(t_critical(0.0, 0.95).is_nan());
    }
}
