//! Worker pool draining the job queue.
//!
//! Each worker loops on [`JobQueue::next`], runs the job's workflow, and
//! records the result. Failed jobs are retried with exponential backoff
//! and jitter until `retry_max` attempts are spent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use magpie_store::models::{Job, JobStatus};

use crate::workflow::{Workflow, WorkflowEngine};

use super::{transition, JobQueue};

const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 60_000;
const JITTER_MS: u64 = 500;

/// N workers over one queue and one engine.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    engine: Arc<WorkflowEngine>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(queue: Arc<JobQueue>, engine: Arc<WorkflowEngine>, workers: usize) -> Self {
        Self {
            queue,
            engine,
            workers: workers.max(1),
        }
    }

    /// Run until `cancel` fires. In-flight jobs finish before workers
    /// stop; pending jobs stay persisted for the next start.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.queue.recover()?;
        info!(workers = self.workers, "worker pool started");

        let mut handles = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            let queue = Arc::clone(&self.queue);
            let engine = Arc::clone(&self.engine);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker, queue, engine, cancel).await;
            }));
        }
        for handle in handles {
            handle.await.context("worker task panicked")?;
        }
        info!("worker pool stopped");
        Ok(())
    }
}

async fn worker_loop(
    worker: usize,
    queue: Arc<JobQueue>,
    engine: Arc<WorkflowEngine>,
    cancel: CancellationToken,
) {
    loop {
        match queue.next(&cancel).await {
            Ok(Some(job)) => process_job(worker, &queue, &engine, &cancel, job).await,
            Ok(None) => break,
            Err(e) => {
                error!(worker, error = %e, "queue error, worker stopping");
                break;
            }
        }
    }
}

async fn process_job(
    worker: usize,
    queue: &JobQueue,
    engine: &WorkflowEngine,
    cancel: &CancellationToken,
    mut job: Job,
) {
    job.attempt += 1;
    info!(worker, job = %job.id, workflow = %job.workflow, attempt = job.attempt, "job started");

    match run_job(engine, &job).await {
        Ok(result) => {
            job.result = Some(result);
            job.error = None;
            finish(queue, &mut job, JobStatus::Completed);
            info!(worker, job = %job.id, "job completed");
        }
        Err(e) => {
            job.error = Some(e.to_string());
            finish(queue, &mut job, JobStatus::Failed);

            if job.attempt <= job.retry_max {
                let delay = backoff_delay(job.attempt);
                warn!(
                    worker,
                    job = %job.id,
                    attempt = job.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "job failed, scheduling retry"
                );
                // Shutdown must not wait out the backoff; the job is
                // requeued either way so it stays pending on disk.
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
                requeue(queue, &mut job);
            } else {
                error!(worker, job = %job.id, error = %e, "job failed permanently");
            }
        }
    }
}

async fn run_job(engine: &WorkflowEngine, job: &Job) -> Result<serde_json::Value> {
    let workflow = Workflow::load(Path::new(&job.workflow))
        .with_context(|| format!("failed to load workflow {}", job.workflow))?;
    let state = engine
        .execute(&workflow, job.arguments.clone())
        .await
        .context("workflow execution error")?;

    if !state.succeeded() {
        anyhow::bail!(
            "{}",
            state
                .error
                .unwrap_or_else(|| "workflow failed".to_string())
        );
    }
    Ok(json!({
        "run_id": state.run_id,
        "tasks": state.task_results.len(),
        "execution_path": state.execution_path,
    }))
}

/// `base * 2^(attempt-1)` capped, plus jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE_MS.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
    let jitter = rand::rng().random_range(0..JITTER_MS);
    Duration::from_millis(exp.min(BACKOFF_CAP_MS) + jitter)
}

fn finish(queue: &JobQueue, job: &mut Job, status: JobStatus) {
    if let Err(e) = transition(job, status) {
        warn!(job = %job.id, error = %e, "unexpected job state");
        return;
    }
    if let Err(e) = queue.store().save(job) {
        error!(job = %job.id, error = %e, "failed to persist job result");
    }
}

fn requeue(queue: &JobQueue, job: &mut Job) {
    let moved = transition(job, JobStatus::Retrying).and_then(|_| transition(job, JobStatus::Pending));
    if let Err(e) = moved {
        warn!(job = %job.id, error = %e, "could not requeue job");
        return;
    }
    if let Err(e) = queue.store().save(job) {
        error!(job = %job.id, error = %e, "failed to persist requeued job");
        return;
    }
    queue.enqueue(job);
}
