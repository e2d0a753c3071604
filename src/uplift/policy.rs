//! Targeting policies and their estimated profit
//!
//! Two estimators are kept deliberately separate:
//!
//! - **Threshold policy** (`margin × tau > cost`): inverse-propensity
//!   weighted. Only units whose historical assignment matches the decision
//!   contribute, each weighted by `1 / P(observed assignment)`.
//! - **Top-percent policy** (highest `p` fraction by `margin × tau − cost`):
//!   matched conditional means over the targeted/treated and
//!   untargeted/control quadrants, scaled by quadrant sizes. An empty
//!   quadrant contributes zero.
//!
//! They agree on balanced, noiseless data but are not equivalent in general.
//! Both report profit per `reporting_scale` units of population.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::linalg::mean;
use super::UpliftError;
use crate::types::{
    EstimatorGap, PolicyDecision, PolicyOutcome, PolicyRow, ProfitCurve, ProfitCurvePoint,
    ScoreTable, ScoredUnit,
};

pub const TARGET_NOBODY: &str = "target_nobody";
pub const TARGET_EVERYBODY: &str = "target_everybody";

/// Largest number of fractions a profit curve may sweep.
pub const MAX_GRID_POINTS: usize = 1_000_000;

/// Relative difference above which a curve endpoint and its baseline are
/// reported as diverging.
pub const ENDPOINT_TOLERANCE: f64 = 1e-9;

/// Curve endpoints (`p = 0`, `p = 1`) whose matched-mean profit differs from
/// the IPW `target_nobody` / `target_everybody` profit. Both estimators target
/// the same units there, so any gap comes from the estimators alone; it is
/// nonzero whenever the treated share differs from the propensity.
pub fn endpoint_gaps(curve: &ProfitCurve, nobody: f64, everybody: f64) -> Vec<EstimatorGap> {
    curve
        .points
        .iter()
        .filter_map(|point| {
            let ipw_profit = if point.top_percent == 0.0 {
                nobody
            } else if point.top_percent == 1.0 {
                everybody
            } else {
                return None;
            };
            let scale = 1.0_f64.max(ipw_profit.abs()).max(point.estimated_profit.abs());
            ((point.estimated_profit - ipw_profit).abs() > ENDPOINT_TOLERANCE * scale).then(|| {
                EstimatorGap {
                    model: curve.model.clone(),
                    top_percent: point.top_percent,
                    matched_profit: point.estimated_profit,
                    ipw_profit,
                }
            })
        })
        .collect()
}

/// Swept fractions for the top-percent profit curve, inclusive of `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopPercentGrid {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Default for TopPercentGrid {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 1.0,
            step: 0.01,
        }
    }
}

impl TopPercentGrid {
    pub fn validate(&self) -> Result<(), UpliftError> {
        if !(self.step > 0.0 && self.step.is_finite()) {
            return Err(UpliftError::invalid(
                "top_percent_grid.step",
                format!("{} must be positive", self.step),
            ));
        }
        if !(0.0 <= self.start && self.start <= self.stop && self.stop <= 1.0) {
            return Err(UpliftError::invalid(
                "top_percent_grid",
                format!("need 0 <= start ({}) <= stop ({}) <= 1", self.start, self.stop),
            ));
        }
        self.point_count().map(|_| ())
    }

    /// Number of swept fractions, rejected above `MAX_GRID_POINTS`.
    pub fn point_count(&self) -> Result<usize, UpliftError> {
        // Slack keeps `stop` when (stop - start) / step lands just under an integer
        let steps = ((self.stop - self.start) / self.step + 1e-9).floor();
        let too_many = || {
            UpliftError::invalid(
                "top_percent_grid.step",
                format!(
                    "{} yields more than {MAX_GRID_POINTS} points over [{}, {}]",
                    self.step, self.start, self.stop
                ),
            )
        };
        if !(steps >= 0.0 && steps < MAX_GRID_POINTS as f64) {
            return Err(too_many());
        }
        (steps as usize).checked_add(1).ok_or_else(too_many)
    }

    /// Swept fractions, `start` to `stop` inclusive. Call after `validate`;
    /// an invalid grid yields no points.
    pub fn points(&self) -> Vec<f64> {
        let count = self.point_count().unwrap_or(0);
        (0..count)
            .map(|i| (self.start + i as f64 * self.step).min(self.stop))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyEvaluator {
    margin: f64,
    cost: f64,
    reporting_scale: f64,
}

impl PolicyEvaluator {
    pub fn new(margin: f64, cost: f64, reporting_scale: f64) -> Result<Self, UpliftError> {
        if !margin.is_finite() {
            return Err(UpliftError::invalid("margin", format!("{margin} is not finite")));
        }
        if !cost.is_finite() {
            return Err(UpliftError::invalid("cost", format!("{cost} is not finite")));
        }
        if !(reporting_scale > 0.0 && reporting_scale.is_finite()) {
            return Err(UpliftError::invalid(
                "reporting_scale",
                format!("{reporting_scale} must be positive"),
            ));
        }
        Ok(Self {
            margin,
            cost,
            reporting_scale,
        })
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn reporting_scale(&self) -> f64 {
        self.reporting_scale
    }

    /// `margin × tau > decision_cost`; a cost of −∞ targets every unit.
    pub fn decide(&self, tau: f64, decision_cost: f64) -> bool {
        decision_cost == f64::NEG_INFINITY || self.margin * tau > decision_cost
    }

    /// IPW profit of a set of decisions, per `reporting_scale` units.
    pub fn ipw_profit(&self, rows: &[ScoredUnit], targets: &[bool]) -> Result<f64, UpliftError> {
        check_population(rows, targets)?;
        let mut total = 0.0;
        for (row, &target) in rows.iter().zip(targets) {
            let unit = &row.unit;
            if unit.treated != target {
                continue;
            }
            let probability = unit.assignment_probability();
            if probability <= 0.0 {
                return Err(UpliftError::invalid(
                    "propensity",
                    format!(
                        "unit '{}' has zero probability of its observed assignment",
                        unit.id
                    ),
                ));
            }
            total += (self.margin * unit.outcome - self.cost * unit.treatment()) / probability;
        }
        Ok(self.reporting_scale * total / rows.len() as f64)
    }

    /// Matched-quadrant profit of a set of decisions, per `reporting_scale`
    /// units.
    pub fn matched_profit(&self, rows: &[ScoredUnit], targets: &[bool]) -> Result<f64, UpliftError> {
        check_population(rows, targets)?;
        let mut targeted_treated = Vec::new();
        let mut untargeted_control = Vec::new();
        let mut targeted = 0usize;
        for (row, &target) in rows.iter().zip(targets) {
            let unit = &row.unit;
            if target {
                targeted += 1;
                if unit.treated {
                    targeted_treated.push(self.margin * unit.outcome - self.cost);
                }
            } else if !unit.treated {
                untargeted_control.push(self.margin * unit.outcome);
            }
        }
        let untargeted = rows.len() - targeted;

        let quadrant = |values: &[f64], size: usize| {
            if values.is_empty() {
                0.0
            } else {
                size as f64 * mean(values)
            }
        };
        let total = quadrant(&targeted_treated, targeted) + quadrant(&untargeted_control, untargeted);
        Ok(self.reporting_scale * total / rows.len() as f64)
    }

    fn outcome(
        &self,
        name: impl Into<String>,
        rows: &[ScoredUnit],
        targets: Vec<bool>,
        estimated_profit: f64,
    ) -> PolicyOutcome {
        let targeted = targets.iter().filter(|&&t| t).count();
        PolicyOutcome {
            name: name.into(),
            targeted_fraction: targeted as f64 / rows.len() as f64,
            estimated_profit,
            decisions: rows
                .iter()
                .zip(targets)
                .map(|(row, target)| PolicyDecision {
                    id: row.unit.id.clone(),
                    target,
                })
                .collect(),
        }
    }

    fn fixed_policy(
        &self,
        name: &str,
        table: &ScoreTable,
        decision_cost: f64,
    ) -> Result<PolicyOutcome, UpliftError> {
        let rows = table.rows();
        let targets: Vec<bool> = rows.iter().map(|_| self.decide(0.0, decision_cost)).collect();
        let profit = self.ipw_profit(rows, &targets)?;
        Ok(self.outcome(name, rows, targets, profit))
    }

    /// Threshold policy on one model's scores, IPW-evaluated.
    pub fn threshold_policy(
        &self,
        table: &ScoreTable,
        model: &str,
    ) -> Result<PolicyOutcome, UpliftError> {
        let scores = model_scores(table, model)?;
        let targets: Vec<bool> = scores.iter().map(|&tau| self.decide(tau, self.cost)).collect();
        let profit = self.ipw_profit(table.rows(), &targets)?;
        let policy = self.outcome(model, table.rows(), targets, profit);
        debug!(
            model,
            targeted_fraction = policy.targeted_fraction,
            estimated_profit = profit,
            "Threshold policy evaluated"
        );
        Ok(policy)
    }

    pub fn target_nobody(&self, table: &ScoreTable) -> Result<PolicyOutcome, UpliftError> {
        self.fixed_policy(TARGET_NOBODY, table, f64::INFINITY)
    }

    pub fn target_everybody(&self, table: &ScoreTable) -> Result<PolicyOutcome, UpliftError> {
        self.fixed_policy(TARGET_EVERYBODY, table, f64::NEG_INFINITY)
    }

    /// Targets the `round(p·N)` units with the highest `margin × tau − cost`,
    /// earlier units first among ties.
    pub fn top_percent_targets(&self, scores: &[f64], top_percent: f64) -> Vec<bool> {
        let n = scores.len();
        let k = ((top_percent.clamp(0.0, 1.0) * n as f64).round() as usize).min(n);
        let value = |tau: f64| self.margin * tau - self.cost;

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| value(scores[b]).total_cmp(&value(scores[a])));

        let mut targets = vec![false; n];
        for &i in &order[..k] {
            targets[i] = true;
        }
        targets
    }

    /// Top-percent policy at one fraction, matched-mean evaluated.
    pub fn top_percent_policy(
        &self,
        table: &ScoreTable,
        model: &str,
        top_percent: f64,
    ) -> Result<PolicyOutcome, UpliftError> {
        let scores = model_scores(table, model)?;
        let targets = self.top_percent_targets(&scores, top_percent);
        let profit = self.matched_profit(table.rows(), &targets)?;
        Ok(self.outcome(
            format!("{model}_top_{:.0}pct", top_percent * 100.0),
            table.rows(),
            targets,
            profit,
        ))
    }

    /// Profit over the grid; `best` is the first point with maximal profit.
    pub fn profit_curve(
        &self,
        table: &ScoreTable,
        model: &str,
        grid: &TopPercentGrid,
    ) -> Result<ProfitCurve, UpliftError> {
        grid.validate()?;
        let scores = model_scores(table, model)?;
        let rows = table.rows();

        let points = grid
            .points()
            .into_iter()
            .map(|p| {
                let targets = self.top_percent_targets(&scores, p);
                Ok(ProfitCurvePoint {
                    top_percent: p,
                    estimated_profit: self.matched_profit(rows, &targets)?,
                })
            })
            .collect::<Result<Vec<_>, UpliftError>>()?;

        let best = points
            .iter()
            .copied()
            .reduce(|best, point| {
                if point.estimated_profit > best.estimated_profit {
                    point
                } else {
                    best
                }
            })
            .ok_or_else(|| UpliftError::invalid("top_percent_grid", "grid has no points"))?;

        info!(
            model,
            best_top_percent = best.top_percent,
            best_profit = best.estimated_profit,
            "Top-percent profit curve"
        );
        Ok(ProfitCurve {
            model: model.to_string(),
            points,
            best,
        })
    }

    /// One threshold-policy row per model, then the two baselines.
    pub fn comparison_table(&self, table: &ScoreTable) -> Result<Vec<PolicyRow>, UpliftError> {
        let mut rows = Vec::with_capacity(table.models().len() + 2);
        for model in table.models() {
            rows.push(self.threshold_policy(table, model)?.row());
        }
        rows.push(self.target_nobody(table)?.row());
        rows.push(self.target_everybody(table)?.row());
        Ok(rows)
    }
}

fn model_scores(table: &ScoreTable, model: &str) -> Result<Vec<f64>, UpliftError> {
    table.column(model).map_err(|unit_id| UpliftError::MissingScore {
        model: model.to_string(),
        unit_id,
    })
}

fn check_population(rows: &[ScoredUnit], targets: &[bool]) -> Result<(), UpliftError> {
    if rows.is_empty() {
        return Err(UpliftError::invalid("population", "cannot evaluate a policy on zero units"));
    }
    if rows.len() != targets.len() {
        return Err(UpliftError::invalid(
            "decisions",
            format!("{} decisions for {} units", targets.len(), rows.len()),
        ));
    }
    Ok(())
}
