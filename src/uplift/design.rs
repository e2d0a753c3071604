//! Full-interaction design matrix
//!
//! Column layout for `p` covariates:
//!
//! ```text
//! [ 1 | x_1 .. x_p | W | x_1·W .. x_p·W ]
//! ```
//!
//! The same row builder serves fitting (actual assignment) and counterfactual
//! prediction (assignment overridden), so both paths see identical columns.

use serde::{Deserialize, Serialize};

use super::linalg::Matrix;
use super::UpliftError;
use crate::types::Unit;

/// Name of the treatment main-effect column.
pub const TREATMENT_COLUMN: &str = "treatment";
pub const INTERCEPT_COLUMN: &str = "(intercept)";

/// Feature schema shared by every unit of a cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionDesign {
    features: Vec<String>,
}

impl InteractionDesign {
    pub fn new(features: Vec<String>) -> Self {
        Self { features }
    }

    /// Take the schema from the first unit and check every other unit has
    /// exactly the same covariate names.
    pub fn from_units(units: &[Unit]) -> Result<Self, UpliftError> {
        let first = units
            .first()
            .ok_or_else(|| UpliftError::estimation(0, "cohort is empty"))?;
        let features: Vec<String> = first.covariates.keys().cloned().collect();

        for unit in units {
            if unit.covariates.len() != features.len()
                || !unit.covariates.keys().zip(&features).all(|(a, b)| a == b)
            {
                return Err(UpliftError::estimation(
                    units.len(),
                    format!(
                        "unit '{}' covariates {:?} differ from schema {:?}",
                        unit.id,
                        unit.covariates.keys().collect::<Vec<_>>(),
                        features
                    ),
                ));
            }
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Number of design columns including the intercept.
    pub fn width(&self) -> usize {
        2 + 2 * self.features.len()
    }

    /// Index of the treatment main-effect column.
    pub fn treatment_index(&self) -> usize {
        1 + self.features.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width());
        names.push(INTERCEPT_COLUMN.to_string());
        names.extend(self.features.iter().cloned());
        names.push(TREATMENT_COLUMN.to_string());
        names.extend(self.features.iter().map(|f| format!("{f}:{TREATMENT_COLUMN}")));
        names
    }

    /// Design row for `unit` with the treatment indicator forced to `treated`.
    pub fn row(&self, unit: &Unit, treated: bool) -> Result<Vec<f64>, UpliftError> {
        let w = if treated { 1.0 } else { 0.0 };
        let mut x = Vec::with_capacity(self.features.len());
        for feature in &self.features {
            let value = unit
                .covariate(feature)
                .ok_or_else(|| UpliftError::MissingCovariate {
                    unit_id: unit.id.clone(),
                    feature: feature.clone(),
                })?;
            x.push(value);
        }

        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        row.extend_from_slice(&x);
        row.push(w);
        row.extend(x.iter().map(|v| v * w));
        Ok(row)
    }

    /// Design matrix under the units' actual assignment.
    pub fn matrix(&self, units: &[Unit]) -> Result<Matrix, UpliftError> {
        let rows = units
            .iter()
            .map(|u| self.row(u, u.treated))
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(Matrix::zeros(0, self.width()));
        }
        Matrix::from_rows(&rows)
            .ok_or_else(|| UpliftError::estimation(units.len(), "ragged design rows"))
    }
}
