//! Fitted linear outcome model shared by the OLS and lasso estimators

use serde::{Deserialize, Serialize};

use super::lasso::PenaltyRule;
use super::OutcomeModel;
use crate::uplift::design::InteractionDesign;
use crate::uplift::linalg::dot;
use crate::uplift::UpliftError;
use crate::types::Unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    InteractionOls,
    InteractionLasso,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InteractionOls => "interaction_ols",
            Self::InteractionLasso => "interaction_lasso",
        }
    }
}

/// Cross-validated penalty values carried by a lasso fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltySelection {
    /// Penalty minimizing mean out-of-fold squared error
    pub lambda_min: f64,
    /// Largest penalty within one standard error of the minimum
    pub lambda_1se: f64,
    pub rule: PenaltyRule,
    /// Penalty the stored coefficients were fitted at
    pub selected: f64,
}

/// Immutable fitted model: a coefficient per interaction-design column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearOutcomeModel {
    pub name: String,
    pub kind: ModelKind,
    pub design: InteractionDesign,
    /// Aligned with `design.column_names()`
    pub coefficients: Vec<f64>,
    /// Size of the cohort the model was fitted on
    pub fitted_on: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty: Option<PenaltySelection>,
}

impl LinearOutcomeModel {
    /// Coefficient of a named design column.
    pub fn coefficient(&self, column: &str) -> Option<f64> {
        self.design
            .column_names()
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.coefficients.get(i).copied())
    }

    pub fn treatment_coefficient(&self) -> f64 {
        self.coefficients[self.design.treatment_index()]
    }

    /// Interaction coefficients in feature order.
    pub fn interaction_coefficients(&self) -> &[f64] {
        &self.coefficients[self.design.treatment_index() + 1..]
    }

    pub fn nonzero_count(&self) -> usize {
        self.coefficients.iter().skip(1).filter(|c| **c != 0.0).count()
    }
}

impl OutcomeModel for LinearOutcomeModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_outcome(&self, unit: &Unit, treated: bool) -> Result<f64, UpliftError> {
        let row = self.design.row(unit, treated)?;
        Ok(dot(&row, &self.coefficients))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Covariates;

    fn model() -> LinearOutcomeModel {
        LinearOutcomeModel {
            name: "m".to_string(),
            kind: ModelKind::InteractionOls,
            design: InteractionDesign::new(vec!["age".to_string()]),
            // 1 + 0.5·age + 2·W + 0.1·age·W
            coefficients: vec![1.0, 0.5, 2.0, 0.1],
            fitted_on: 10,
            penalty: None,
        }
    }

    #[test]
    fn test_predict_outcome_under_override() {
        let mut c = Covariates::new();
        c.insert("age".to_string(), 10.0);
        let unit = Unit::new("a", c, false, 0.0, 0.5);
        let m = model();
        assert!((m.predict_outcome(&unit, false).unwrap() - 6.0).abs() < 1e-12);
        assert!((m.predict_outcome(&unit, true).unwrap() - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_named_coefficients() {
        let m = model();
        assert_eq!(m.coefficient("treatment"), Some(2.0));
        assert_eq!(m.coefficient("age:treatment"), Some(0.1));
        assert_eq!(m.coefficient("missing"), None);
        assert_eq!(m.treatment_coefficient(), 2.0);
        assert_eq!(m.interaction_coefficients(), &[0.1]);
        assert_eq!(m.nonzero_count(), 3);
    }
}
