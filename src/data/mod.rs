//! Tabular input and report output
//!
//! - `loader`: CSV unit tables and external score tables
//! - `report`: JSON and CSV writers for evaluation reports

pub mod loader;
pub mod report;

pub use loader::{load_external_scores, load_units, parse_external_scores, parse_units, UnitTable};
pub use report::{write_bundle, write_curves_csv, write_lift_csv, write_policy_csv, write_scores_csv};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{source_name} has no header row")]
    EmptyFile { source_name: String },

    #[error("{source_name} has no '{column}' column")]
    MissingColumn { source_name: String, column: String },

    #[error("{source_name} line {line}: duplicate unit id '{id}'")]
    DuplicateId {
        source_name: String,
        line: usize,
        id: String,
    },

    #[error("{source_name} has no usable rows ({rejected} rejected)")]
    NoRows { source_name: String, rejected: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
