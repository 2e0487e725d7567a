//! Integration tests for the job store: CRUD, listing order, cleanup,
//! and restart resumption.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};

use magpie_store::config::StoreConfig;
use magpie_store::jobs::JobStore;
use magpie_store::models::{Job, JobPriority, JobStatus};

fn temp_store() -> (JobStore, tempfile::TempDir) {
    let tmp = tempfile::TempDir::new().expect("temp dir");
    let config = StoreConfig::new(tmp.path());
    let store = JobStore::open(&config).expect("store should open");
    (store, tmp)
}

fn sample_job(workflow: &str, priority: JobPriority) -> Job {
    let mut args = BTreeMap::new();
    args.insert("spec".to_string(), serde_json::json!("petstore.yaml"));
    Job::new(workflow, args, priority, 3)
}

#[test]
fn save_and_load_roundtrip() {
    let (store, _tmp) = temp_store();

    let job = sample_job("flows/classify.yaml", JobPriority::Normal);
    store.save(&job).unwrap();

    let loaded = store.load(job.id).unwrap().expect("job should exist");
    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.workflow, "flows/classify.yaml");
    assert_eq!(loaded.status, JobStatus::Pending);
    assert_eq!(loaded.arguments["spec"], serde_json::json!("petstore.yaml"));
}

#[test]
fn load_missing_returns_none() {
    let (store, _tmp) = temp_store();
    let missing = store.load(uuid::Uuid::new_v4()).unwrap();
    assert!(missing.is_none());
}

#[test]
fn delete_is_idempotent() {
    let (store, _tmp) = temp_store();

    let job = sample_job("flows/a.yaml", JobPriority::Low);
    store.save(&job).unwrap();

    store.delete(job.id).unwrap();
    assert!(store.load(job.id).unwrap().is_none());

    // Deleting again is not an error.
    store.delete(job.id).unwrap();
}

#[test]
fn list_is_newest_first() {
    let (store, _tmp) = temp_store();

    let mut older = sample_job("flows/old.yaml", JobPriority::Normal);
    older.created_at = Utc::now() - Duration::hours(2);
    let newer = sample_job("flows/new.yaml", JobPriority::Normal);

    store.save(&older).unwrap();
    store.save(&newer).unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].workflow, "flows/new.yaml");
    assert_eq!(listed[1].workflow, "flows/old.yaml");
}

#[test]
fn save_overwrites_existing_record() {
    let (store, _tmp) = temp_store();

    let mut job = sample_job("flows/a.yaml", JobPriority::Normal);
    store.save(&job).unwrap();

    job.status = JobStatus::Completed;
    job.completed_at = Some(Utc::now());
    job.result = Some(serde_json::json!({"patterns": 4}));
    store.save(&job).unwrap();

    let loaded = store.load(job.id).unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Completed);
    assert_eq!(loaded.result, Some(serde_json::json!({"patterns": 4})));
}

#[test]
fn cleanup_removes_only_old_terminal_jobs() {
    let (store, _tmp) = temp_store();

    // Old completed job: should be removed.
    let mut old_done = sample_job("flows/done.yaml", JobPriority::Normal);
    old_done.status = JobStatus::Completed;
    old_done.completed_at = Some(Utc::now() - Duration::hours(48));
    store.save(&old_done).unwrap();

    // Recent failed job: terminal but too new.
    let mut recent_failed = sample_job("flows/failed.yaml", JobPriority::Normal);
    recent_failed.status = JobStatus::Failed;
    recent_failed.completed_at = Some(Utc::now() - Duration::hours(1));
    store.save(&recent_failed).unwrap();

    // Old pending job: old but not terminal.
    let mut old_pending = sample_job("flows/pending.yaml", JobPriority::Normal);
    old_pending.created_at = Utc::now() - Duration::hours(72);
    store.save(&old_pending).unwrap();

    let removed = store.cleanup_terminal(24).unwrap();
    assert_eq!(removed, 1);

    assert!(store.load(old_done.id).unwrap().is_none());
    assert!(store.load(recent_failed.id).unwrap().is_some());
    assert!(store.load(old_pending.id).unwrap().is_some());
}

#[test]
fn resumable_requeues_pending_and_retrying() {
    let (store, _tmp) = temp_store();

    let mut first = sample_job("flows/first.yaml", JobPriority::Normal);
    first.created_at = Utc::now() - Duration::minutes(10);
    store.save(&first).unwrap();

    let mut retrying = sample_job("flows/retrying.yaml", JobPriority::High);
    retrying.status = JobStatus::Retrying;
    retrying.created_at = Utc::now() - Duration::minutes(5);
    store.save(&retrying).unwrap();

    let mut done = sample_job("flows/done.yaml", JobPriority::Normal);
    done.status = JobStatus::Completed;
    store.save(&done).unwrap();

    let resumable = store.resumable().unwrap();
    assert_eq!(resumable.len(), 2);
    // Oldest first, and retrying reset to pending.
    assert_eq!(resumable[0].workflow, "flows/first.yaml");
    assert_eq!(resumable[1].workflow, "flows/retrying.yaml");
    assert!(resumable.iter().all(|j| j.status == JobStatus::Pending));
}
