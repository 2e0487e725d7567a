//! Job record store: one JSON file per job under `jobs/`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::models::{Job, JobStatus};

/// Persistent job storage rooted at the configured data directory.
#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    /// Open (and create if needed) the job store for `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let dir = config.jobs_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create jobs directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write (or overwrite) a job record.
    pub fn save(&self, job: &Job) -> Result<()> {
        crate::write_json_atomic(&self.record_path(job.id), job)
            .with_context(|| format!("failed to save job {}", job.id))
    }

    /// Load a job by id. Returns `None` when no record exists.
    pub fn load(&self, id: Uuid) -> Result<Option<Job>> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let job = crate::read_json(&path)?;
        Ok(Some(job))
    }

    /// Delete a job record. A missing record is not an error.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to delete job record {}", path.display()))
            }
        }
    }

    /// List every stored job, newest first.
    ///
    /// Unreadable records are skipped with a warning rather than failing the
    /// whole listing.
    pub fn list(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read jobs directory {}", self.dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match crate::read_json::<Job>(&path) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job record"),
            }
        }

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    /// Delete terminal jobs whose record is older than `older_than_hours`.
    ///
    /// Returns the number of records removed. Pending and running jobs are
    /// never touched.
    pub fn cleanup_terminal(&self, older_than_hours: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::hours(older_than_hours);
        let mut removed = 0;

        for job in self.list()? {
            if !job.status.is_terminal() {
                continue;
            }
            let stamp = job.completed_at.unwrap_or(job.created_at);
            if stamp < cutoff {
                self.delete(job.id)?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Jobs that should be re-queued after a restart: pending and retrying
    /// records, with `retrying` reset to `pending`.
    pub fn resumable(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .list()?
            .into_iter()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Retrying))
            .collect();

        for job in &mut jobs {
            if job.status == JobStatus::Retrying {
                job.status = JobStatus::Pending;
            }
        }

        // Oldest first so resumed work keeps its submission order.
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }
}
