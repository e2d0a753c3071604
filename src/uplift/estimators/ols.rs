//! Full-interaction ordinary least squares

use tracing::info;

use super::{check_treatment_variation, CateEstimator, LinearOutcomeModel, ModelKind};
use crate::uplift::design::InteractionDesign;
use crate::uplift::linalg::{least_squares, RankDeficiency};
use crate::uplift::UpliftError;
use crate::types::Unit;

/// Default relative tolerance for declaring a design column dependent.
pub const DEFAULT_RANK_TOLERANCE: f64 = 1e-7;

/// Outcome ~ covariates + treatment + covariate×treatment, by OLS.
#[derive(Debug, Clone)]
pub struct InteractionOls {
    name: String,
    rank_tolerance: f64,
}

impl InteractionOls {
    pub fn new(name: impl Into<String>, rank_tolerance: f64) -> Self {
        Self {
            name: name.into(),
            rank_tolerance,
        }
    }
}

impl Default for InteractionOls {
    fn default() -> Self {
        Self::new("ols_interaction", DEFAULT_RANK_TOLERANCE)
    }
}

impl CateEstimator for InteractionOls {
    type Model = LinearOutcomeModel;

    fn fit(&self, units: &[Unit]) -> Result<LinearOutcomeModel, UpliftError> {
        let design = InteractionDesign::from_units(units)?;
        check_treatment_variation(units)?;

        let x = design.matrix(units)?;
        let y: Vec<f64> = units.iter().map(|u| u.outcome).collect();

        let coefficients = least_squares(&x, &y, self.rank_tolerance).map_err(|e| match e {
            RankDeficiency::Underdetermined { rows, cols } => UpliftError::estimation(
                units.len(),
                format!("{rows} units cannot identify {cols} interaction coefficients"),
            ),
            RankDeficiency::Collinear { column } => UpliftError::estimation(
                units.len(),
                format!(
                    "design column '{}' is collinear with earlier columns",
                    design
                        .column_names()
                        .get(column)
                        .map_or("?", String::as_str)
                ),
            ),
        })?;

        info!(
            model = %self.name,
            units = units.len(),
            features = design.features().len(),
            treatment_effect = coefficients[design.treatment_index()],
            "Fitted interaction OLS"
        );

        Ok(LinearOutcomeModel {
            name: self.name.clone(),
            kind: ModelKind::InteractionOls,
            design,
            coefficients,
            fitted_on: units.len(),
            penalty: None,
        })
    }
}
