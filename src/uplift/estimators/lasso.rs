//! Cross-validated lasso on the full-interaction design
//!
//! ## Algorithm
//!
//! 1. Standardize every predictor column (mean 0, population SD 1) and center
//!    the outcome; the intercept is never penalized.
//! 2. Build a penalty path of `n_lambda` values log-spaced from
//!    `λ_max = max_j |x̃_jᵀ(y − ȳ)| / n` (all coefficients zero) down to
//!    `λ_max × lambda_min_ratio`.
//! 3. Solve each penalty by cyclic coordinate descent with soft-thresholding,
//!    warm-started from the previous penalty's solution.
//! 4. Assign units to `k` folds by a seeded shuffle, refit the path on each
//!    fold's complement (in parallel) and score squared error on the fold.
//! 5. Select a penalty with the configured `PenaltyRule` and keep the
//!    full-cohort solution at that penalty.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    check_treatment_variation, CateEstimator, LinearOutcomeModel, ModelKind, PenaltySelection,
};
use crate::uplift::design::InteractionDesign;
use crate::uplift::linalg::{dot, mean, mean_and_population_sd};
use crate::uplift::UpliftError;
use crate::types::Unit;

/// Which cross-validated penalty the final model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyRule {
    /// Penalty with the smallest mean out-of-fold error
    MinError,
    /// Largest penalty whose error is within one standard error of the minimum
    #[default]
    OneStandardError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LassoSettings {
    pub cv_folds: usize,
    pub n_lambda: usize,
    pub lambda_min_ratio: f64,
    pub max_iterations: usize,
    /// Convergence threshold on the largest squared coefficient update
    pub tolerance: f64,
    /// Seed for fold assignment
    pub seed: u64,
    pub rule: PenaltyRule,
}

impl Default for LassoSettings {
    fn default() -> Self {
        Self {
            cv_folds: 10,
            n_lambda: 100,
            lambda_min_ratio: 1e-4,
            max_iterations: 10_000,
            tolerance: 1e-7,
            seed: 42,
            rule: PenaltyRule::OneStandardError,
        }
    }
}

/// Cross-validation curve along the penalty path (penalties descending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub lambdas: Vec<f64>,
    /// Mean out-of-fold squared error per penalty
    pub cv_error: Vec<f64>,
    /// Standard error of `cv_error` across folds
    pub cv_std_error: Vec<f64>,
    pub index_min: usize,
    pub index_1se: usize,
}

impl CrossValidation {
    fn from_fold_errors(lambdas: Vec<f64>, fold_errors: &[Vec<f64>]) -> Self {
        let k = fold_errors.len() as f64;
        let mut cv_error = Vec::with_capacity(lambdas.len());
        let mut cv_std_error = Vec::with_capacity(lambdas.len());
        for l in 0..lambdas.len() {
            let errors: Vec<f64> = fold_errors.iter().map(|f| f[l]).collect();
            let m = mean(&errors);
            let var = errors.iter().map(|e| (e - m).powi(2)).sum::<f64>() / (k - 1.0).max(1.0);
            cv_error.push(m);
            cv_std_error.push((var / k).sqrt());
        }

        let index_min = cv_error
            .iter()
            .enumerate()
            .fold(0, |best, (i, e)| if *e < cv_error[best] { i } else { best });
        let limit = cv_error[index_min] + cv_std_error[index_min];
        let index_1se = cv_error
            .iter()
            .position(|e| *e <= limit)
            .unwrap_or(index_min);

        Self {
            lambdas,
            cv_error,
            cv_std_error,
            index_min,
            index_1se,
        }
    }

    pub fn lambda_min(&self) -> f64 {
        self.lambdas[self.index_min]
    }

    pub fn lambda_1se(&self) -> f64 {
        self.lambdas[self.index_1se]
    }

    pub fn selected_index(&self, rule: PenaltyRule) -> usize {
        match rule {
            PenaltyRule::MinError => self.index_min,
            PenaltyRule::OneStandardError => self.index_1se,
        }
    }
}

/// Lasso estimator over the full-interaction design.
#[derive(Debug, Clone)]
pub struct InteractionLasso {
    name: String,
    settings: LassoSettings,
}

impl InteractionLasso {
    pub fn new(name: impl Into<String>, settings: LassoSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &LassoSettings {
        &self.settings
    }

    /// Penalty path and out-of-fold error curve for `units`.
    pub fn cross_validate(&self, units: &[Unit]) -> Result<CrossValidation, UpliftError> {
        let (_, rows, y) = self.prepare(units)?;
        Ok(self.cross_validate_rows(&rows, &y))
    }

    fn prepare(
        &self,
        units: &[Unit],
    ) -> Result<(InteractionDesign, Vec<Vec<f64>>, Vec<f64>), UpliftError> {
        let design = InteractionDesign::from_units(units)?;
        check_treatment_variation(units)?;
        let k = self.settings.cv_folds;
        if k < 2 || units.len() < k {
            return Err(UpliftError::estimation(
                units.len(),
                format!("{k}-fold cross-validation needs at least {k} units and k >= 2"),
            ));
        }

        // Predictor rows without the intercept column
        let rows = units
            .iter()
            .map(|u| design.row(u, u.treated).map(|r| r[1..].to_vec()))
            .collect::<Result<Vec<_>, _>>()?;
        let y: Vec<f64> = units.iter().map(|u| u.outcome).collect();
        Ok((design, rows, y))
    }

    fn cross_validate_rows(&self, rows: &[Vec<f64>], y: &[f64]) -> CrossValidation {
        let s = &self.settings;
        let lambdas = lambda_path(rows, y, s.n_lambda, s.lambda_min_ratio);

        let n = rows.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(s.seed));
        let mut fold_of = vec![0usize; n];
        for (position, &i) in order.iter().enumerate() {
            fold_of[i] = position % s.cv_folds;
        }

        let fold_errors: Vec<Vec<f64>> = (0..s.cv_folds)
            .into_par_iter()
            .map(|fold| {
                let (train, test): (Vec<usize>, Vec<usize>) =
                    (0..n).partition(|&i| fold_of[i] != fold);
                let train_rows: Vec<&[f64]> = train.iter().map(|&i| rows[i].as_slice()).collect();
                let train_y: Vec<f64> = train.iter().map(|&i| y[i]).collect();
                let path = fit_path(&train_rows, &train_y, &lambdas, s);

                path.iter()
                    .map(|coefficients| {
                        test.iter()
                            .map(|&i| (y[i] - predict(coefficients, &rows[i])).powi(2))
                            .sum::<f64>()
                            / test.len() as f64
                    })
                    .collect()
            })
            .collect();

        let cv = CrossValidation::from_fold_errors(lambdas, &fold_errors);
        debug!(
            folds = s.cv_folds,
            lambda_min = cv.lambda_min(),
            lambda_1se = cv.lambda_1se(),
            min_error = cv.cv_error[cv.index_min],
            "Lasso cross-validation complete"
        );
        cv
    }
}

impl Default for InteractionLasso {
    fn default() -> Self {
        Self::new("lasso_interaction", LassoSettings::default())
    }
}

impl CateEstimator for InteractionLasso {
    type Model = LinearOutcomeModel;

    fn fit(&self, units: &[Unit]) -> Result<LinearOutcomeModel, UpliftError> {
        let (design, rows, y) = self.prepare(units)?;
        let cv = self.cross_validate_rows(&rows, &y);
        let selected = cv.selected_index(self.settings.rule);

        let all_rows: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
        let coefficients = fit_path(&all_rows, &y, &cv.lambdas[..=selected], &self.settings)
            .pop()
            .ok_or_else(|| UpliftError::estimation(units.len(), "empty penalty path"))?;

        let penalty = PenaltySelection {
            lambda_min: cv.lambda_min(),
            lambda_1se: cv.lambda_1se(),
            rule: self.settings.rule,
            selected: cv.lambdas[selected],
        };

        let model = LinearOutcomeModel {
            name: self.name.clone(),
            kind: ModelKind::InteractionLasso,
            design,
            coefficients,
            fitted_on: units.len(),
            penalty: Some(penalty),
        };

        info!(
            model = %self.name,
            units = units.len(),
            lambda = penalty.selected,
            rule = ?penalty.rule,
            nonzero = model.nonzero_count(),
            "Fitted interaction lasso"
        );
        Ok(model)
    }
}

// ============================================================================
// Coordinate Descent
// ============================================================================

fn soft_threshold(z: f64, lambda: f64) -> f64 {
    if z > lambda {
        z - lambda
    } else if z < -lambda {
        z + lambda
    } else {
        0.0
    }
}

/// Intercept-first coefficients applied to a predictor row.
fn predict(coefficients: &[f64], row: &[f64]) -> f64 {
    coefficients[0] + dot(&coefficients[1..], row)
}

/// Columns standardized to mean 0 / population SD 1; constant columns are
/// zeroed and flagged with SD 0.
fn standardize(rows: &[&[f64]]) -> (Vec<Vec<f64>>, Vec<(f64, f64)>) {
    let p = rows.first().map_or(0, |r| r.len());
    let mut columns = Vec::with_capacity(p);
    let mut stats = Vec::with_capacity(p);
    for j in 0..p {
        let raw: Vec<f64> = rows.iter().map(|r| r[j]).collect();
        let (m, sd) = mean_and_population_sd(&raw);
        let column = if sd > 0.0 {
            raw.iter().map(|v| (v - m) / sd).collect()
        } else {
            vec![0.0; raw.len()]
        };
        columns.push(column);
        stats.push((m, if sd > 0.0 { sd } else { 0.0 }));
    }
    (columns, stats)
}

/// Log-spaced penalties from the smallest all-zero penalty downwards.
fn lambda_path(rows: &[Vec<f64>], y: &[f64], n_lambda: usize, min_ratio: f64) -> Vec<f64> {
    let refs: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
    let (columns, _) = standardize(&refs);
    let y_mean = mean(y);
    let centered: Vec<f64> = y.iter().map(|v| v - y_mean).collect();
    let n = y.len() as f64;

    let lambda_max = columns
        .iter()
        .map(|c| dot(c, &centered).abs() / n)
        .fold(0.0_f64, f64::max)
        .max(f64::EPSILON);

    let n_lambda = n_lambda.max(1);
    if n_lambda == 1 {
        return vec![lambda_max];
    }
    (0..n_lambda)
        .map(|l| lambda_max * min_ratio.powf(l as f64 / (n_lambda - 1) as f64))
        .collect()
}

/// Warm-started coordinate descent along `lambdas`; one intercept-first,
/// original-scale coefficient vector per penalty.
fn fit_path(rows: &[&[f64]], y: &[f64], lambdas: &[f64], settings: &LassoSettings) -> Vec<Vec<f64>> {
    let (columns, stats) = standardize(rows);
    let n = y.len() as f64;
    let y_mean = mean(y);
    let mut residual: Vec<f64> = y.iter().map(|v| v - y_mean).collect();
    let mut beta = vec![0.0; columns.len()];
    let mut path = Vec::with_capacity(lambdas.len());

    for &lambda in lambdas {
        let mut converged = false;
        for _ in 0..settings.max_iterations {
            let mut max_change: f64 = 0.0;
            for (j, column) in columns.iter().enumerate() {
                if stats[j].1 == 0.0 {
                    continue;
                }
                let z = dot(column, &residual) / n + beta[j];
                let updated = soft_threshold(z, lambda);
                let delta = updated - beta[j];
                if delta != 0.0 {
                    for (r, x) in residual.iter_mut().zip(column) {
                        *r -= delta * x;
                    }
                    beta[j] = updated;
                    max_change = max_change.max(delta * delta);
                }
            }
            if max_change < settings.tolerance {
                converged = true;
                break;
            }
        }
        if !converged {
            debug!(lambda, "Coordinate descent hit the iteration cap");
        }

        // Back to the original scale
        let mut coefficients = Vec::with_capacity(beta.len() + 1);
        let mut intercept = y_mean;
        coefficients.push(0.0);
        for (b, (m, sd)) in beta.iter().zip(&stats) {
            let c = if *sd > 0.0 { b / sd } else { 0.0 };
            intercept -= c * m;
            coefficients.push(c);
        }
        coefficients[0] = intercept;
        path.push(coefficients);
    }
    path
}
