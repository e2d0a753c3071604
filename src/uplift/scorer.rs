//! Counterfactual scoring
//!
//! `tau(unit) = predict(unit, treated) − predict(unit, control)`, computed by
//! literally predicting both counterfactual outcomes and differencing. No
//! coefficient algebra is used, so any `OutcomeModel` works unchanged.

use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

use super::estimators::{EffectScorer, OutcomeModel};
use super::UpliftError;
use crate::types::{ScoreTable, ScoredUnit, Unit};

/// Turns a fitted outcome model into an effect scorer.
#[derive(Debug, Clone)]
pub struct CounterfactualScorer<M> {
    model: M,
}

impl<M: OutcomeModel> CounterfactualScorer<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// (predicted outcome if treated, predicted outcome if control)
    pub fn counterfactuals(&self, unit: &Unit) -> Result<(f64, f64), UpliftError> {
        Ok((
            self.model.predict_outcome(unit, true)?,
            self.model.predict_outcome(unit, false)?,
        ))
    }
}

impl<M: OutcomeModel> EffectScorer for CounterfactualScorer<M> {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn score(&self, unit: &Unit) -> Result<f64, UpliftError> {
        let (treated, control) = self.counterfactuals(unit)?;
        Ok(treated - control)
    }
}

/// Score every unit with every scorer. Scorers run in parallel; each score
/// column keeps the unit order.
pub fn score_cohort(
    units: &[Unit],
    scorers: &[&dyn EffectScorer],
) -> Result<ScoreTable, UpliftError> {
    let mut models: Vec<String> = Vec::with_capacity(scorers.len());
    for scorer in scorers {
        if models.iter().any(|m| m == scorer.name()) {
            return Err(UpliftError::invalid(
                "scorer name",
                format!("'{}' is used by more than one scorer", scorer.name()),
            ));
        }
        models.push(scorer.name().to_string());
    }

    let columns: Vec<Vec<f64>> = scorers
        .par_iter()
        .map(|scorer| {
            units
                .iter()
                .map(|u| scorer.score(u))
                .collect::<Result<Vec<f64>, UpliftError>>()
        })
        .collect::<Result<_, _>>()?;

    let rows = units
        .iter()
        .enumerate()
        .map(|(i, unit)| ScoredUnit {
            unit: unit.clone(),
            tau: models
                .iter()
                .zip(&columns)
                .map(|(name, column)| (name.clone(), column[i]))
                .collect::<BTreeMap<_, _>>(),
        })
        .collect();

    debug!(units = units.len(), models = ?models, "Scored cohort");
    Ok(ScoreTable::new(models, rows))
}
