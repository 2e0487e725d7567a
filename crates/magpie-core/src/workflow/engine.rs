//! Workflow execution.
//!
//! Steps run in declaration order; `parallel` blocks join their tasks
//! concurrently. A failed task aborts the run unless it sets
//! `continue_on_error`; aborted runs still carry every outcome recorded up
//! to that point, and the final state is persisted when a run store is
//! attached.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use magpie_store::models::{RunRecord, RunStatus, TaskOutcomeStatus, TaskResultRecord};
use magpie_store::runs::RunStore;

use crate::mapping::map_output;
use crate::workflow::{resolve_value, Step, TaskStep, ToolRegistry, Workflow};

/// One task's recorded result.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: TaskOutcomeStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub attempts: u32,
}

impl TaskOutcome {
    fn skipped(reason: &str) -> Self {
        Self {
            status: TaskOutcomeStatus::Skipped,
            output: None,
            error: Some(reason.to_string()),
            duration_ms: 0,
            attempts: 0,
        }
    }
}

/// Mutable state of a run: variables, per-task outcomes, and the order in
/// which tasks finished.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    pub variables: BTreeMap<String, Value>,
    pub task_results: BTreeMap<String, TaskOutcome>,
    pub execution_path: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// First fatal task error, when the run failed.
    pub error: Option<String>,
}

impl RunState {
    fn new(workflow_id: &str, variables: BTreeMap<String, Value>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id: workflow_id.to_string(),
            status: RunStatus::Running,
            variables,
            task_results: BTreeMap::new(),
            execution_path: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            id: self.run_id,
            workflow_id: self.workflow_id.clone(),
            status: self.status,
            variables: self.variables.clone(),
            task_results: self
                .task_results
                .iter()
                .map(|(id, outcome)| {
                    (
                        id.clone(),
                        TaskResultRecord {
                            task_id: id.clone(),
                            status: outcome.status,
                            output: outcome.output.clone(),
                            error: outcome.error.clone(),
                            duration_ms: outcome.duration_ms,
                            attempts: outcome.attempts,
                        },
                    )
                })
                .collect(),
            execution_path: self.execution_path.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Executes workflows against a tool registry.
pub struct WorkflowEngine {
    tools: ToolRegistry,
    store: Option<RunStore>,
}

impl WorkflowEngine {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools, store: None }
    }

    /// Persist final run states through the given store.
    pub fn with_store(mut self, store: RunStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Run a workflow to completion. Task failures are reported through
    /// the returned state's status; `Err` is reserved for definition and
    /// persistence problems.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        initial: BTreeMap<String, Value>,
    ) -> Result<RunState> {
        workflow.validate()?;
        let mut state = RunState::new(&workflow.id, initial);
        info!(workflow = %workflow.id, run = %state.run_id, "workflow started");

        let result = self.execute_steps(&workflow.steps, &mut state).await;
        state.completed_at = Some(Utc::now());
        match result {
            Ok(()) => {
                state.status = RunStatus::Completed;
                info!(
                    workflow = %workflow.id,
                    run = %state.run_id,
                    tasks = state.task_results.len(),
                    "workflow completed"
                );
            }
            Err(e) => {
                state.status = RunStatus::Failed;
                state.error = Some(e.to_string());
                warn!(workflow = %workflow.id, run = %state.run_id, error = %e, "workflow failed");
            }
        }

        if let Some(store) = &self.store {
            store
                .save(&state.to_record())
                .context("failed to persist run state")?;
        }
        Ok(state)
    }

    fn execute_steps<'a>(
        &'a self,
        steps: &'a [Step],
        state: &'a mut RunState,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            for step in steps {
                match step {
                    Step::Task(task) => self.execute_task(task, state).await?,
                    Step::Parallel { tasks, .. } => self.execute_parallel(tasks, state).await?,
                    Step::Conditional {
                        condition,
                        then,
                        otherwise,
                    } => {
                        if condition.evaluate(&state.variables) {
                            self.execute_steps(then, state).await?;
                        } else {
                            self.execute_steps(otherwise, state).await?;
                        }
                    }
                    Step::Loop(looped) => self.execute_loop(looped, state).await?,
                    Step::Compose { tasks, .. } => self.execute_compose(tasks, state).await?,
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn execute_task(&self, task: &TaskStep, state: &mut RunState) -> Result<()> {
        if !self.dependencies_met(task, state) {
            state
                .task_results
                .insert(task.id.clone(), TaskOutcome::skipped("dependencies not met"));
            state.execution_path.push(format!("{}:skipped", task.id));
            return Ok(());
        }

        let params = resolve_parameters(&task.parameters, &state.variables);
        let outcome = self.run_task(task, params).await;
        self.apply_outcome(task, outcome, state)
    }

    async fn execute_parallel(&self, tasks: &[TaskStep], state: &mut RunState) -> Result<()> {
        // Parameters are resolved against the state as it was when the
        // block started; outcomes are applied in declaration order.
        let mut runnable = Vec::new();
        for task in tasks {
            if !self.dependencies_met(task, state) {
                state
                    .task_results
                    .insert(task.id.clone(), TaskOutcome::skipped("dependencies not met"));
                state.execution_path.push(format!("{}:skipped", task.id));
                continue;
            }
            let params = resolve_parameters(&task.parameters, &state.variables);
            runnable.push((task, params));
        }

        let outcomes = join_all(
            runnable
                .iter()
                .map(|(task, params)| self.run_task(task, params.clone())),
        )
        .await;

        let mut first_failure = None;
        for ((task, _), outcome) in runnable.iter().zip(outcomes) {
            if let Err(e) = self.apply_outcome(task, outcome, state) {
                first_failure.get_or_insert(e);
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn execute_compose(&self, tasks: &[TaskStep], state: &mut RunState) -> Result<()> {
        let mut piped: Option<Value> = None;
        for task in tasks {
            if !self.dependencies_met(task, state) {
                state
                    .task_results
                    .insert(task.id.clone(), TaskOutcome::skipped("dependencies not met"));
                state.execution_path.push(format!("{}:skipped", task.id));
                continue;
            }

            let mut params = resolve_parameters(&task.parameters, &state.variables);
            if let Some(previous) = piped.take() {
                params.insert("piped_input".to_string(), previous);
            }
            let outcome = self.run_task(task, params).await;
            piped = outcome.output.clone();
            self.apply_outcome(task, outcome, state)?;
        }
        Ok(())
    }

    async fn execute_loop(
        &self,
        looped: &crate::workflow::LoopStep,
        state: &mut RunState,
    ) -> Result<()> {
        if let Some(over) = &looped.over {
            let resolved = resolve_value(&Value::String(over.clone()), &state.variables);
            let Value::Array(items) = resolved else {
                anyhow::bail!("loop 'over' value '{over}' did not resolve to an array");
            };
            let variable = looped.variable.as_deref().unwrap_or("item");
            for item in items {
                state.variables.insert(variable.to_string(), item);
                self.execute_steps(&looped.body, state).await?;
            }
            return Ok(());
        }

        // Validation guarantees a condition and max_iterations here.
        let Some(condition) = &looped.condition else {
            anyhow::bail!("loop has neither 'over' nor 'condition'");
        };
        let cap = looped.max_iterations.unwrap_or(0);
        let mut iterations = 0;
        while condition.evaluate(&state.variables) {
            if iterations >= cap {
                warn!(workflow = %state.workflow_id, cap, "loop hit max_iterations, breaking");
                break;
            }
            iterations += 1;
            self.execute_steps(&looped.body, state).await?;
        }
        Ok(())
    }

    /// Invoke the tool with retry. Never touches shared state, which lets
    /// parallel blocks run several of these at once.
    async fn run_task(&self, task: &TaskStep, params: BTreeMap<String, Value>) -> TaskOutcome {
        let Some(handler) = self.tools.get(&task.tool) else {
            return TaskOutcome {
                status: TaskOutcomeStatus::Failed,
                output: None,
                error: Some(format!("unknown tool: {}", task.tool)),
                duration_ms: 0,
                attempts: 1,
            };
        };

        let max_attempts = task.retry.as_ref().map(|r| r.max_attempts).unwrap_or(1);
        let delay = Duration::from_millis(task.retry.as_ref().map(|r| r.delay_ms).unwrap_or(1000));
        let start = Instant::now();

        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match handler.call(&params).await {
                Ok(output) => {
                    return TaskOutcome {
                        status: TaskOutcomeStatus::Success,
                        output: Some(output),
                        error: None,
                        duration_ms: start.elapsed().as_millis() as u64,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        warn!(
                            task = %task.id,
                            attempt,
                            error = %last_error,
                            "task attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        TaskOutcome {
            status: TaskOutcomeStatus::Failed,
            output: None,
            error: Some(last_error),
            duration_ms: start.elapsed().as_millis() as u64,
            attempts: max_attempts,
        }
    }

    /// Record an outcome: run the output mapping on success, append to the
    /// execution path, and decide whether a failure aborts the run.
    fn apply_outcome(
        &self,
        task: &TaskStep,
        outcome: TaskOutcome,
        state: &mut RunState,
    ) -> Result<()> {
        let failed = outcome.status == TaskOutcomeStatus::Failed;

        if outcome.status == TaskOutcomeStatus::Success && !task.output_mapping.is_empty() {
            if let Some(output) = &outcome.output {
                let mapped = map_output(output, &task.output_mapping);
                for problem in &mapped.errors {
                    warn!(task = %task.id, %problem, "output mapping problem");
                }
                state.variables.extend(mapped.variables);
            }
        }

        let tag = if failed { "failed" } else { "success" };
        state.execution_path.push(format!("{}:{tag}", task.id));
        let error = outcome.error.clone();
        state.task_results.insert(task.id.clone(), outcome);

        if failed {
            let reason = error.unwrap_or_else(|| "unknown error".to_string());
            if task.continue_on_error {
                warn!(task = %task.id, error = %reason, "task failed, continuing");
            } else {
                anyhow::bail!("task '{}' failed: {reason}", task.id);
            }
        }
        Ok(())
    }

    fn dependencies_met(&self, task: &TaskStep, state: &RunState) -> bool {
        task.depends_on.iter().all(|dep| {
            state
                .task_results
                .get(dep)
                .is_some_and(|r| r.status == TaskOutcomeStatus::Success)
        })
    }
}

fn resolve_parameters(
    parameters: &BTreeMap<String, Value>,
    variables: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    parameters
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, variables)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::workflow::ToolHandler;

    /// Fails a fixed number of times before succeeding.
    struct Flaky {
        failures: AtomicU32,
    }

    #[async_trait]
    impl ToolHandler for Flaky {
        async fn call(&self, _params: &BTreeMap<String, Value>) -> Result<Value> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            })
            .is_ok()
            {
                anyhow::bail!("transient failure");
            }
            Ok(json!("recovered"))
        }
    }

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(ToolRegistry::with_builtins())
    }

    fn parse(yaml: &str) -> Workflow {
        Workflow::from_yaml(yaml).expect("workflow should parse")
    }

    #[tokio::test]
    async fn runs_tasks_and_maps_outputs() {
        let workflow = parse(
            r#"
id: set-and-read
steps:
  - type: task
    id: seed
    tool: set
    parameters:
      greeting: hello
    output_mapping:
      - source: greeting
        target: greeting
  - type: task
    id: announce
    tool: log
    depends_on: [seed]
    parameters:
      message: "${greeting} world"
"#,
        );
        let state = engine().execute(&workflow, BTreeMap::new()).await.unwrap();
        assert!(state.succeeded());
        assert_eq!(state.variables["greeting"], json!("hello"));
        assert_eq!(
            state.execution_path,
            vec!["seed:success".to_string(), "announce:success".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_tool_fails_the_run() {
        let workflow = parse(
            r#"
id: broken
steps:
  - type: task
    id: bad
    tool: does_not_exist
"#,
        );
        let state = engine().execute(&workflow, BTreeMap::new()).await.unwrap();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.error.as_deref().unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn continue_on_error_keeps_going() {
        let workflow = parse(
            r#"
id: tolerant
steps:
  - type: task
    id: bad
    tool: does_not_exist
    continue_on_error: true
  - type: task
    id: after
    tool: set
    parameters:
      ok: true
"#,
        );
        let state = engine().execute(&workflow, BTreeMap::new()).await.unwrap();
        assert!(state.succeeded());
        assert_eq!(
            state.task_results["bad"].status,
            TaskOutcomeStatus::Failed
        );
        assert_eq!(
            state.task_results["after"].status,
            TaskOutcomeStatus::Success
        );
    }

    #[tokio::test]
    async fn dependency_on_failed_task_skips() {
        let workflow = parse(
            r#"
id: skip-chain
steps:
  - type: task
    id: bad
    tool: does_not_exist
    continue_on_error: true
  - type: task
    id: downstream
    tool: set
    depends_on: [bad]
"#,
        );
        let state = engine().execute(&workflow, BTreeMap::new()).await.unwrap();
        assert_eq!(
            state.task_results["downstream"].status,
            TaskOutcomeStatus::Skipped
        );
        assert!(state
            .execution_path
            .contains(&"downstream:skipped".to_string()));
    }

    #[tokio::test]
    async fn retry_policy_recovers_flaky_tools() {
        let mut tools = ToolRegistry::with_builtins();
        tools.register(
            "flaky",
            Arc::new(Flaky {
                failures: AtomicU32::new(2),
            }),
        );
        let workflow = parse(
            r#"
id: retried
steps:
  - type: task
    id: wobble
    tool: flaky
    retry:
      max_attempts: 3
      delay_ms: 1
"#,
        );
        let state = WorkflowEngine::new(tools)
            .execute(&workflow, BTreeMap::new())
            .await
            .unwrap();
        assert!(state.succeeded());
        assert_eq!(state.task_results["wobble"].attempts, 3);
    }

    #[tokio::test]
    async fn conditional_picks_the_right_branch() {
        let workflow = parse(
            r#"
id: branchy
steps:
  - type: conditional
    condition:
      equals: ["$mode", "fancy"]
    then:
      - type: task
        id: fancy
        tool: set
    else:
      - type: task
        id: plain
        tool: set
"#,
        );
        let mut vars = BTreeMap::new();
        vars.insert("mode".to_string(), json!("plain"));
        let state = engine().execute(&workflow, vars).await.unwrap();
        assert!(state.task_results.contains_key("plain"));
        assert!(!state.task_results.contains_key("fancy"));
    }

    #[tokio::test]
    async fn for_loop_binds_each_item() {
        let workflow = parse(
            r#"
id: looper
steps:
  - type: loop
    over: "$names"
    variable: name
    body:
      - type: task
        id: greet
        tool: log
        parameters:
          message: "hi ${name}"
"#,
        );
        let mut vars = BTreeMap::new();
        vars.insert("names".to_string(), json!(["ada", "brian", "grace"]));
        // Body task ids repeat across iterations; the path records each pass.
        let state = engine().execute(&workflow, vars).await.unwrap();
        assert!(state.succeeded());
        assert_eq!(
            state
                .execution_path
                .iter()
                .filter(|p| *p == "greet:success")
                .count(),
            3
        );
        assert_eq!(state.variables["name"], json!("grace"));
    }

    #[tokio::test]
    async fn while_loop_respects_cap() {
        let workflow = parse(
            r#"
id: capped
steps:
  - type: task
    id: seed
    tool: set
    parameters:
      keep_going: true
    output_mapping:
      - source: keep_going
        target: keep_going
  - type: loop
    condition:
      equals: ["$keep_going", true]
    max_iterations: 4
    body:
      - type: task
        id: spin
        tool: log
        parameters:
          message: spinning
"#,
        );
        let state = engine().execute(&workflow, BTreeMap::new()).await.unwrap();
        assert!(state.succeeded());
        assert_eq!(
            state
                .execution_path
                .iter()
                .filter(|p| *p == "spin:success")
                .count(),
            4
        );
    }

    #[tokio::test]
    async fn parallel_block_records_every_task() {
        let workflow = parse(
            r#"
id: fanout
steps:
  - type: parallel
    tasks:
      - id: a
        tool: set
        parameters:
          n: 1
      - id: b
        tool: set
        parameters:
          n: 2
      - id: c
        tool: set
        parameters:
          n: 3
"#,
        );
        let state = engine().execute(&workflow, BTreeMap::new()).await.unwrap();
        assert!(state.succeeded());
        assert_eq!(state.task_results.len(), 3);
        assert!(state
            .task_results
            .values()
            .all(|r| r.status == TaskOutcomeStatus::Success));
    }

    #[tokio::test]
    async fn compose_pipes_outputs_forward() {
        let workflow = parse(
            r#"
id: piped
steps:
  - type: compose
    tasks:
      - id: first
        tool: set
        parameters:
          payload: seed
      - id: second
        tool: set
"#,
        );
        let state = engine().execute(&workflow, BTreeMap::new()).await.unwrap();
        assert!(state.succeeded());
        let second = state.task_results["second"].output.as_ref().unwrap();
        assert_eq!(second["piped_input"]["payload"], json!("seed"));
    }

    #[tokio::test]
    async fn final_state_is_persisted_when_store_attached() {
        let dir = tempfile::tempdir().unwrap();
        let config = magpie_store::config::StoreConfig::new(dir.path());
        let store = RunStore::open(&config).unwrap();
        let workflow = parse(
            r#"
id: persisted
steps:
  - type: task
    id: only
    tool: set
"#,
        );
        let state = WorkflowEngine::new(ToolRegistry::with_builtins())
            .with_store(RunStore::open(&config).unwrap())
            .execute(&workflow, BTreeMap::new())
            .await
            .unwrap();

        let loaded = store.load(state.run_id).unwrap().expect("run saved");
        assert_eq!(loaded.workflow_id, "persisted");
        assert_eq!(loaded.status, RunStatus::Completed);
        assert!(loaded.task_results.contains_key("only"));
    }
}
