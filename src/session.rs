//! On-disk batch snapshot so a restarted CLI can pick a batch back up.
//!
//! The snapshot is plain JSON. Writes go to a sibling temp file first and are
//! renamed into place, so a crash mid-write leaves the previous snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VeoError;
use crate::tracking::Batch;

pub const SNAPSHOT_VERSION: u32 = 1;
pub const DEFAULT_SESSION_FILE: &str = "veobatch-session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub batch: Batch,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, batch: &Batch) -> Result<(), VeoError> {
        let snapshot = BatchSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            batch: batch.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), jobs = batch.len(), "Session saved");
        Ok(())
    }

    pub fn load(&self) -> Result<Batch, VeoError> {
        Ok(self.load_snapshot()?.batch)
    }

    pub fn load_snapshot(&self) -> Result<BatchSnapshot, VeoError> {
        if !self.exists() {
            return Err(VeoError::SessionNotFound(self.path.clone()));
        }
        let contents = fs::read_to_string(&self.path)?;
        let snapshot: BatchSnapshot = serde_json::from_str(&contents)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(VeoError::UnsupportedSnapshot(snapshot.version));
        }
        if snapshot.batch.is_empty() {
            return Err(VeoError::NoPrompts);
        }
        Ok(snapshot)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_SESSION_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
