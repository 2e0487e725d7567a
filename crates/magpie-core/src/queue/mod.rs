//! Priority job queue over the file-backed job store.
//!
//! Jobs move through a checked state machine; the in-memory queue holds
//! only ids, with the store as the source of truth. Workers pull with
//! [`JobQueue::next`], which blocks until a job or shutdown.

pub mod worker;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use magpie_store::jobs::JobStore;
use magpie_store::models::{Job, JobPriority, JobStatus};

// ---------------------------------------------------------------------------
// Status transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Whether `from -> to` is a legal move in the job lifecycle.
pub fn transition_allowed(from: JobStatus, to: JobStatus) -> bool {
    matches!(
        (from, to),
        (JobStatus::Pending, JobStatus::Running)
            | (JobStatus::Pending, JobStatus::Cancelled)
            | (JobStatus::Running, JobStatus::Completed)
            | (JobStatus::Running, JobStatus::Failed)
            | (JobStatus::Failed, JobStatus::Retrying)
            | (JobStatus::Retrying, JobStatus::Pending)
    )
}

/// Apply a transition, stamping `started_at`/`completed_at` as the job
/// enters and leaves execution.
pub fn transition(job: &mut Job, to: JobStatus) -> Result<(), TransitionError> {
    if !transition_allowed(job.status, to) {
        return Err(TransitionError {
            from: job.status,
            to,
        });
    }
    match to {
        JobStatus::Running => job.started_at = Some(Utc::now()),
        JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed => {
            job.completed_at = Some(Utc::now());
        }
        JobStatus::Retrying | JobStatus::Pending => job.completed_at = None,
    }
    job.status = to;
    Ok(())
}

// ---------------------------------------------------------------------------
// Priority queue
// ---------------------------------------------------------------------------

/// Three FIFO lanes; `pop` drains high before normal before low.
#[derive(Debug, Default)]
struct PriorityQueue {
    high: VecDeque<Uuid>,
    normal: VecDeque<Uuid>,
    low: VecDeque<Uuid>,
}

impl PriorityQueue {
    fn push(&mut self, priority: JobPriority, id: Uuid) {
        match priority {
            JobPriority::High => self.high.push_back(id),
            JobPriority::Normal => self.normal.push_back(id),
            JobPriority::Low => self.low.push_back(id),
        }
    }

    fn pop(&mut self) -> Option<Uuid> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Aggregate counts over every stored job, plus the live queue depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,
    pub queued: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub retrying: usize,
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Shared coordinator between submitters and workers.
pub struct JobQueue {
    store: JobStore,
    queue: Mutex<PriorityQueue>,
    notify: Notify,
}

impl JobQueue {
    pub fn new(store: JobStore) -> Self {
        Self {
            store,
            queue: Mutex::new(PriorityQueue::default()),
            notify: Notify::new(),
        }
    }

    /// Re-queue jobs left pending or retrying by a previous process.
    pub fn recover(&self) -> Result<usize> {
        let resumable = self.store.resumable()?;
        let count = resumable.len();
        for job in resumable {
            // resumable() already reset retrying jobs to pending.
            self.store.save(&job)?;
            self.enqueue(&job);
        }
        if count > 0 {
            info!(count, "re-queued persisted jobs");
        }
        Ok(count)
    }

    /// Persist and enqueue a new job.
    pub fn submit(
        &self,
        workflow: impl Into<String>,
        arguments: BTreeMap<String, serde_json::Value>,
        priority: JobPriority,
        retry_max: u32,
    ) -> Result<Job> {
        let job = Job::new(workflow, arguments, priority, retry_max);
        self.store.save(&job)?;
        self.enqueue(&job);
        info!(job = %job.id, workflow = %job.workflow, priority = %job.priority, "job submitted");
        Ok(job)
    }

    pub fn enqueue(&self, job: &Job) {
        self.lock().push(job.priority, job.id);
        self.notify.notify_waiters();
    }

    /// Claim the next job, waiting until one is available. Returns `None`
    /// once `cancel` fires, letting workers drain and stop.
    pub async fn next(&self, cancel: &CancellationToken) -> Result<Option<Job>> {
        loop {
            // Shutdown wins over the backlog; anything still pending stays
            // pending on disk for the next process to recover.
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(job) = self.claim()? {
                return Ok(Some(job));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
            }
        }
    }

    fn claim(&self) -> Result<Option<Job>> {
        loop {
            let Some(id) = self.lock().pop() else {
                return Ok(None);
            };
            let Some(mut job) = self.store.load(id)? else {
                warn!(job = %id, "queued job vanished from store");
                continue;
            };
            if job.status != JobStatus::Pending {
                debug!(job = %id, status = ?job.status, "skipping non-pending queued job");
                continue;
            }
            transition(&mut job, JobStatus::Running).context("claiming job")?;
            self.store.save(&job)?;
            return Ok(Some(job));
        }
    }

    /// Cancel a pending job. Returns false when the job is already
    /// running or finished.
    pub fn cancel(&self, id: Uuid) -> Result<bool> {
        let Some(mut job) = self.store.load(id)? else {
            return Ok(false);
        };
        if transition(&mut job, JobStatus::Cancelled).is_err() {
            return Ok(false);
        }
        self.store.save(&job)?;
        info!(job = %id, "job cancelled");
        Ok(true)
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let jobs = self.store.list()?;
        let mut stats = QueueStats {
            total: jobs.len(),
            queued: self.lock().len(),
            ..Default::default()
        };
        for job in &jobs {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
                JobStatus::Retrying => stats.retrying += 1,
            }
        }
        Ok(stats)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PriorityQueue> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
