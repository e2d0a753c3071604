//! Adapter for precomputed effect scores (e.g. an externally trained
//! tree ensemble). Scores are looked up by unit id; no outcome model exists.

use std::collections::HashMap;

use super::EffectScorer;
use crate::uplift::UpliftError;
use crate::types::Unit;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalScores {
    name: String,
    scores: HashMap<String, f64>,
}

impl ExternalScores {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scores: HashMap::new(),
        }
    }

    pub fn from_pairs<I, K>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            scores: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Returns the previous score if `id` was already present.
    pub fn insert(&mut self, id: impl Into<String>, tau: f64) -> Option<f64> {
        self.scores.insert(id.into(), tau)
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.scores.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Number of `units` that have a score.
    pub fn coverage(&self, units: &[Unit]) -> usize {
        units.iter().filter(|u| self.scores.contains_key(&u.id)).count()
    }
}

impl EffectScorer for ExternalScores {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, unit: &Unit) -> Result<f64, UpliftError> {
        self.get(&unit.id).ok_or_else(|| UpliftError::MissingScore {
            model: self.name.clone(),
            unit_id: unit.id.clone(),
        })
    }
}
