//! Workflow engine over the built-in tools, with persisted run state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use magpie_core::queue::worker::WorkerPool;
use magpie_core::queue::JobQueue;
use magpie_core::workflow::{ToolRegistry, Workflow, WorkflowEngine};
use magpie_store::jobs::JobStore;
use magpie_store::models::{JobPriority, JobStatus, RunStatus};
use magpie_store::runs::RunStore;
use magpie_test_utils::{sample_openapi_yaml, sample_registry_json, sample_workflow_yaml, TestDataDir};

#[tokio::test]
async fn classify_workflow_runs_and_persists() {
    let data = TestDataDir::new();
    let spec = data.write("pets.yaml", sample_openapi_yaml());
    let workflow =
        Workflow::from_yaml(&sample_workflow_yaml(&spec)).expect("fixture workflow parses");

    let engine = WorkflowEngine::new(ToolRegistry::with_builtins())
        .with_store(RunStore::open(&data.config).expect("open run store"));
    let state = engine
        .execute(&workflow, BTreeMap::new())
        .await
        .expect("run succeeds");

    assert!(state.succeeded());
    assert_eq!(state.variables["endpoint_count"], json!(7));
    assert!(state.execution_path.contains(&"report:success".to_string()));

    let store = RunStore::open(&data.config).expect("open run store");
    let record = store
        .load(state.run_id)
        .expect("load run")
        .expect("run persisted");
    assert_eq!(record.workflow_id, "classify-and-report");
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.task_results.len(), 2);
}

#[tokio::test]
async fn validate_metadata_workflow_flags_fixable_entry() {
    let data = TestDataDir::new();
    let registry = data.write("registry.json", &sample_registry_json());
    let workflow = Workflow::from_yaml(&format!(
        r#"id: check-registry
steps:
  - type: task
    id: validate
    tool: validate_metadata
    parameters:
      file: "{}"
    output_mapping:
      - source: valid
        target: registry_valid
        required: true
"#,
        registry.display()
    ))
    .expect("workflow parses");

    let state = WorkflowEngine::new(ToolRegistry::with_builtins())
        .execute(&workflow, BTreeMap::new())
        .await
        .expect("run succeeds");

    assert!(state.succeeded());
    // The second fixture entry has a bare id and no version.
    assert_eq!(state.variables["registry_valid"], json!(false));
}

#[tokio::test]
async fn submitted_job_runs_the_workflow_through_the_pool() {
    let data = TestDataDir::new();
    let spec = data.write("pets.yaml", sample_openapi_yaml());
    let workflow_path = data.write("classify.yaml", &sample_workflow_yaml(&spec));

    let queue = Arc::new(JobQueue::new(
        JobStore::open(&data.config).expect("open job store"),
    ));
    let engine = Arc::new(WorkflowEngine::new(ToolRegistry::with_builtins()));
    let job = queue
        .submit(
            workflow_path.to_string_lossy().into_owned(),
            BTreeMap::new(),
            JobPriority::High,
            0,
        )
        .expect("submit");

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        stopper.cancel();
    });
    WorkerPool::new(Arc::clone(&queue), engine, 1)
        .run(cancel)
        .await
        .expect("pool run");

    let done = queue
        .store()
        .load(job.id)
        .expect("load job")
        .expect("job kept");
    assert_eq!(done.status, JobStatus::Completed);
    let result = done.result.expect("result recorded");
    assert_eq!(result["tasks"], json!(2));
}
