//! Artifact Storage
//!
//! Fitted models and score tables persisted in a Sled embedded database.
//! Key format:
//!
//! - `{run}/model/{name}`: one `LinearOutcomeModel`
//! - `{run}/scores`: the `ScoreTable` the run's report was computed from
//!
//! Values are JSON with exact float round-tripping, so a reloaded model
//! predicts bit-identical outcomes.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::ScoreTable;
use crate::uplift::LinearOutcomeModel;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid run id '{0}': must be non-empty and contain no '/'")]
    InvalidRunId(String),
}

/// Stored value with the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stored<T> {
    stored_at: DateTime<Utc>,
    value: T,
}

pub struct ArtifactStore {
    db: Db,
}

impl ArtifactStore {
    /// Open or create the artifact database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        info!(path = %path.display(), "Artifact store opened");
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing)
    pub fn open_temp() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn check_run(run: &str) -> Result<(), StorageError> {
        if run.is_empty() || run.contains('/') {
            return Err(StorageError::InvalidRunId(run.to_string()));
        }
        Ok(())
    }

    fn model_key(run: &str, name: &str) -> String {
        format!("{run}/model/{name}")
    }

    fn scores_key(run: &str) -> String {
        format!("{run}/scores")
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let stored = Stored {
            stored_at: Utc::now(),
            value,
        };
        self.db.insert(key.as_bytes(), serde_json::to_vec(&stored)?)?;
        self.db.flush()?;
        debug!(key, "Stored artifact");
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice::<Stored<T>>(&bytes)?.value)),
            None => Ok(None),
        }
    }

    pub fn store_model(&self, run: &str, model: &LinearOutcomeModel) -> Result<(), StorageError> {
        Self::check_run(run)?;
        self.put(&Self::model_key(run, &model.name), model)
    }

    pub fn load_model(&self, run: &str, name: &str) -> Result<Option<LinearOutcomeModel>, StorageError> {
        Self::check_run(run)?;
        self.get(&Self::model_key(run, name))
    }

    /// Every model stored under `run`, ordered by name.
    pub fn load_models(&self, run: &str) -> Result<Vec<LinearOutcomeModel>, StorageError> {
        Self::check_run(run)?;
        let prefix = format!("{run}/model/");
        self.db
            .scan_prefix(prefix.as_bytes())
            .map(|entry| -> Result<LinearOutcomeModel, StorageError> {
                let (_, bytes) = entry?;
                Ok(serde_json::from_slice::<Stored<LinearOutcomeModel>>(&bytes)?.value)
            })
            .collect()
    }

    pub fn store_scores(&self, run: &str, scores: &ScoreTable) -> Result<(), StorageError> {
        Self::check_run(run)?;
        self.put(&Self::scores_key(run), scores)
    }

    pub fn load_scores(&self, run: &str) -> Result<Option<ScoreTable>, StorageError> {
        Self::check_run(run)?;
        self.get(&Self::scores_key(run))
    }

    /// Distinct run ids with at least one artifact.
    pub fn runs(&self) -> Result<Vec<String>, StorageError> {
        let mut runs = BTreeSet::new();
        for entry in self.db.iter() {
            let (key, _) = entry?;
            if let Some(run) = std::str::from_utf8(&key)
                .ok()
                .and_then(|k| k.split('/').next())
            {
                runs.insert(run.to_string());
            }
        }
        Ok(runs.into_iter().collect())
    }

    /// Remove every artifact of `run`; returns the number of keys removed.
    pub fn delete_run(&self, run: &str) -> Result<usize, StorageError> {
        Self::check_run(run)?;
        let prefix = format!("{run}/");
        let keys: Vec<sled::IVec> = self
            .db
            .scan_prefix(prefix.as_bytes())
            .keys()
            .collect::<Result<_, _>>()?;
        for key in &keys {
            self.db.remove(key)?;
        }
        self.db.flush()?;
        Ok(keys.len())
    }
}
