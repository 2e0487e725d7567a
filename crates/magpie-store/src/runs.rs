//! Workflow run store: one JSON file per run under `runs/`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::models::RunRecord;

/// Persistent workflow-run storage rooted at the configured data directory.
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    /// Open (and create if needed) the run store for `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let dir = config.runs_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create runs directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write (or overwrite) a run record.
    pub fn save(&self, run: &RunRecord) -> Result<()> {
        crate::write_json_atomic(&self.record_path(run.id), run)
            .with_context(|| format!("failed to save run {}", run.id))
    }

    /// Load a run by id. Returns `None` when no record exists.
    pub fn load(&self, id: Uuid) -> Result<Option<RunRecord>> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let run = crate::read_json(&path)?;
        Ok(Some(run))
    }

    /// List every stored run, newest first. Unreadable records are skipped
    /// with a warning.
    pub fn list(&self) -> Result<Vec<RunRecord>> {
        let mut runs = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read runs directory {}", self.dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match crate::read_json::<RunRecord>(&path) {
                Ok(run) => runs.push(run),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable run record"),
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}
