//! Seeded training/validation splitter
//!
//! Each unit is assigned to training with an i.i.d. Bernoulli(p) draw from a
//! `StdRng` seeded with the configured seed, so the same seed and the same
//! population order always reproduce the same partition.

use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use super::UpliftError;
use crate::types::{Cohort, Unit};

/// Default probability that a unit lands in the training cohort.
pub const DEFAULT_SPLIT_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSplitter {
    probability: f64,
    seed: u64,
}

impl SampleSplitter {
    pub fn new(probability: f64, seed: u64) -> Result<Self, UpliftError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(UpliftError::invalid(
                "split_probability",
                format!("{probability} is outside [0, 1]"),
            ));
        }
        Ok(Self { probability, seed })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Training-membership flag per unit, in population order.
    ///
    /// Pure: never fails and may return an all-true or all-false vector.
    pub fn assign(&self, units: &[Unit]) -> Vec<bool> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        match Bernoulli::new(self.probability) {
            Ok(draw) => units.iter().map(|_| draw.sample(&mut rng)).collect(),
            // Unreachable for a validated probability
            Err(_) => vec![false; units.len()],
        }
    }

    /// Partition the population, rejecting splits that leave a cohort empty.
    pub fn split(&self, units: &[Unit]) -> Result<Cohort, UpliftError> {
        let flags = self.assign(units);
        let mut cohort = Cohort::default();
        for (unit, in_training) in units.iter().zip(flags) {
            if in_training {
                cohort.training.push(unit.clone());
            } else {
                cohort.validation.push(unit.clone());
            }
        }

        let (training, validation) = cohort.sizes();
        debug!(training, validation, seed = self.seed, "Population split");

        if training == 0 || validation == 0 {
            return Err(UpliftError::Split {
                training,
                validation,
                seed: self.seed,
            });
        }

        info!(
            training,
            validation,
            seed = self.seed,
            probability = self.probability,
            "Split population into training/validation cohorts"
        );
        Ok(cohort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Covariates;

    fn population(n: usize) -> Vec<Unit> {
        (0..n)
            .map(|i| Unit::new(format!("u{i}"), Covariates::new(), i % 2 == 0, i as f64, 0.5))
            .collect()
    }

    #[test]
    fn test_same_seed_same_partition() {
        let units = population(500);
        let splitter = SampleSplitter::new(0.5, 1999).unwrap();
        assert_eq!(splitter.assign(&units), splitter.assign(&units));

        let a = splitter.split(&units).unwrap();
        let b = splitter.split(&units).unwrap();
        assert_eq!(a.training, b.training);
        assert_eq!(a.validation, b.validation);
    }

    #[test]
    fn test_different_seed_changes_partition() {
        let units = population(500);
        let a = SampleSplitter::new(0.5, 1).unwrap().assign(&units);
        let b = SampleSplitter::new(0.5, 2).unwrap().assign(&units);
        assert_ne!(a, b);
    }

    #[test]
    fn test_every_unit_in_exactly_one_cohort() {
        let units = population(300);
        let cohort = SampleSplitter::new(0.3, 7).unwrap().split(&units).unwrap();
        assert_eq!(cohort.total(), units.len());
        for unit in &units {
            let in_training = cohort.training.iter().any(|u| u.id == unit.id);
            let in_validation = cohort.validation.iter().any(|u| u.id == unit.id);
            assert!(in_training ^ in_validation, "unit {} misplaced", unit.id);
        }
    }

    #[test]
    fn test_split_fraction_near_probability() {
        let units = population(10_000);
        let cohort = SampleSplitter::new(0.5, 42).unwrap().split(&units).unwrap();
        let share = cohort.training.len() as f64 / units.len() as f64;
        assert!((share - 0.5).abs() < 0.03, "training share {share}");
    }

    #[test]
    fn test_degenerate_split_is_rejected_with_seed() {
        let units = population(20);
        let err = SampleSplitter::new(1.0, 5).unwrap().split(&units).unwrap_err();
        assert_eq!(
            err,
            UpliftError::Split {
                training: 20,
                validation: 0,
                seed: 5
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        assert!(SampleSplitter::new(1.5, 0).is_err());
        assert!(SampleSplitter::new(-0.1, 0).is_err());
    }
}
