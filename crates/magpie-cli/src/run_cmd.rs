//! `magpie run` command: execute a workflow in-process.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use magpie_core::workflow::{ToolRegistry, Workflow, WorkflowEngine};
use magpie_store::config::StoreConfig;
use magpie_store::models::TaskOutcomeStatus;
use magpie_store::runs::RunStore;

/// Parse `--var key=value` pairs. Values parse as JSON where possible,
/// falling back to plain strings.
pub fn parse_vars(pairs: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut vars = BTreeMap::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("invalid --var '{pair}', expected key=value"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

pub async fn run(store: &StoreConfig, workflow_path: &Path, vars: &[String]) -> Result<()> {
    let workflow = Workflow::load(workflow_path)?;
    let variables = parse_vars(vars)?;

    let engine =
        WorkflowEngine::new(ToolRegistry::with_builtins()).with_store(RunStore::open(store)?);
    let state = engine.execute(&workflow, variables).await?;

    println!("Run {} ({})", state.run_id, state.workflow_id);
    for (task_id, outcome) in &state.task_results {
        let mark = match outcome.status {
            TaskOutcomeStatus::Success => "✓",
            TaskOutcomeStatus::Failed => "✗",
            TaskOutcomeStatus::Skipped => "-",
        };
        let detail = outcome
            .error
            .as_deref()
            .map(|e| format!(" ({e})"))
            .unwrap_or_default();
        println!(
            "  {mark} {task_id} [{} attempt(s), {} ms]{detail}",
            outcome.attempts, outcome.duration_ms
        );
    }

    if state.succeeded() {
        println!("Workflow completed.");
        Ok(())
    } else {
        anyhow::bail!(
            "workflow failed: {}",
            state.error.unwrap_or_else(|| "see task results".to_string())
        );
    }
}
