//! Integration tests for the workflow run store.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use uuid::Uuid;

use magpie_store::config::StoreConfig;
use magpie_store::models::{RunRecord, RunStatus, TaskOutcomeStatus, TaskResultRecord};
use magpie_store::runs::RunStore;

fn temp_store() -> (RunStore, tempfile::TempDir) {
    let tmp = tempfile::TempDir::new().expect("temp dir");
    let config = StoreConfig::new(tmp.path());
    let store = RunStore::open(&config).expect("store should open");
    (store, tmp)
}

fn sample_run(workflow_id: &str) -> RunRecord {
    RunRecord {
        id: Uuid::new_v4(),
        workflow_id: workflow_id.to_string(),
        status: RunStatus::Running,
        variables: BTreeMap::new(),
        task_results: BTreeMap::new(),
        execution_path: Vec::new(),
        started_at: Utc::now(),
        completed_at: None,
    }
}

#[test]
fn save_and_load_roundtrip() {
    let (store, _tmp) = temp_store();

    let mut run = sample_run("scaffold-ui");
    run.variables
        .insert("spec".to_string(), serde_json::json!("petstore.yaml"));
    run.task_results.insert(
        "classify".to_string(),
        TaskResultRecord {
            task_id: "classify".to_string(),
            status: TaskOutcomeStatus::Success,
            output: Some(serde_json::json!({"endpoints": 7})),
            error: None,
            duration_ms: 12,
            attempts: 1,
        },
    );
    run.execution_path.push("classify:success".to_string());
    store.save(&run).unwrap();

    let loaded = store.load(run.id).unwrap().expect("run should exist");
    assert_eq!(loaded.workflow_id, "scaffold-ui");
    assert_eq!(loaded.status, RunStatus::Running);
    assert_eq!(loaded.execution_path, vec!["classify:success"]);
    assert_eq!(
        loaded.task_results["classify"].status,
        TaskOutcomeStatus::Success
    );
}

#[test]
fn load_missing_returns_none() {
    let (store, _tmp) = temp_store();
    assert!(store.load(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn list_is_newest_first() {
    let (store, _tmp) = temp_store();

    let mut older = sample_run("old-flow");
    older.started_at = Utc::now() - Duration::hours(1);
    let newer = sample_run("new-flow");

    store.save(&older).unwrap();
    store.save(&newer).unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].workflow_id, "new-flow");
    assert_eq!(listed[1].workflow_id, "old-flow");
}

#[test]
fn completed_run_roundtrips_final_state() {
    let (store, _tmp) = temp_store();

    let mut run = sample_run("scaffold-ui");
    run.status = RunStatus::Completed;
    run.completed_at = Some(Utc::now());
    store.save(&run).unwrap();

    let loaded = store.load(run.id).unwrap().unwrap();
    assert_eq!(loaded.status, RunStatus::Completed);
    assert!(loaded.completed_at.is_some());
}
