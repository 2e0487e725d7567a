//! `magpie job` commands: submit, worker, status, cancel, list, cleanup.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use magpie_core::queue::worker::WorkerPool;
use magpie_core::queue::JobQueue;
use magpie_core::workflow::{ToolRegistry, WorkflowEngine};
use magpie_store::config::StoreConfig;
use magpie_store::jobs::JobStore;
use magpie_store::models::{Job, JobPriority};
use magpie_store::runs::RunStore;

use crate::run_cmd::parse_vars;

fn open_queue(store: &StoreConfig) -> Result<JobQueue> {
    Ok(JobQueue::new(JobStore::open(store)?))
}

pub fn submit(
    store: &StoreConfig,
    workflow: &Path,
    priority: JobPriority,
    retry_max: u32,
    vars: &[String],
) -> Result<()> {
    let arguments = parse_vars(vars)?;
    let queue = open_queue(store)?;
    let workflow = workflow
        .canonicalize()
        .with_context(|| format!("workflow file not found: {}", workflow.display()))?;
    let job = queue.submit(
        workflow.to_string_lossy().into_owned(),
        arguments,
        priority,
        retry_max,
    )?;
    println!("Submitted job {} ({} priority)", job.id, job.priority);
    println!("Run `magpie job worker` to process the queue.");
    Ok(())
}

/// Run a worker pool until Ctrl-C.
pub async fn worker(store: &StoreConfig, workers: usize) -> Result<()> {
    let queue = Arc::new(open_queue(store)?);
    let engine = Arc::new(
        WorkflowEngine::new(ToolRegistry::with_builtins()).with_store(RunStore::open(store)?),
    );
    let pool = WorkerPool::new(Arc::clone(&queue), engine, workers);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, draining in-flight jobs");
            shutdown.cancel();
        }
    });

    pool.run(cancel).await
}

pub fn status(store: &StoreConfig, id: Uuid) -> Result<()> {
    let queue = open_queue(store)?;
    match queue.store().load(id)? {
        Some(job) => {
            print_job(&job);
            Ok(())
        }
        None => anyhow::bail!("no job with id {id}"),
    }
}

pub fn cancel(store: &StoreConfig, id: Uuid) -> Result<()> {
    let queue = open_queue(store)?;
    if queue.cancel(id)? {
        println!("Job {id} cancelled.");
        Ok(())
    } else {
        anyhow::bail!("job {id} is not pending (already running, finished, or unknown)");
    }
}

pub fn list(store: &StoreConfig) -> Result<()> {
    let queue = open_queue(store)?;
    let jobs = queue.store().list()?;
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<9}  {:<8}  {:<19}  WORKFLOW",
        "ID", "STATUS", "PRIORITY", "CREATED"
    );
    for job in &jobs {
        println!(
            "{:<36}  {:<9}  {:<8}  {:<19}  {}",
            job.id,
            job.status.to_string(),
            job.priority.to_string(),
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.workflow
        );
    }

    let stats = queue.stats()?;
    println!();
    println!(
        "{} total: {} pending, {} running, {} completed, {} failed, {} cancelled",
        stats.total, stats.pending, stats.running, stats.completed, stats.failed, stats.cancelled
    );
    Ok(())
}

pub fn cleanup(store: &StoreConfig, hours: i64) -> Result<()> {
    let queue = open_queue(store)?;
    let removed = queue.store().cleanup_terminal(hours)?;
    println!("Removed {removed} finished jobs older than {hours}h.");
    Ok(())
}

fn print_job(job: &Job) {
    println!("Job {}", job.id);
    println!("  workflow:  {}", job.workflow);
    println!("  status:    {}", job.status);
    println!("  priority:  {}", job.priority);
    println!("  attempts:  {}/{}", job.attempt, job.retry_max + 1);
    println!("  created:   {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(started) = job.started_at {
        println!("  started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(completed) = job.completed_at {
        println!("  completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(error) = &job.error {
        println!("  error:     {error}");
    }
    if let Some(result) = &job.result {
        match serde_json::to_string_pretty(result) {
            Ok(rendered) => println!("  result:\n{rendered}"),
            Err(_) => println!("  result:    <unprintable>"),
        }
    }
}
