//! Tests for StateManager

use super::*;
use crate::config::ResumeFrom;
use crate::storage::Storage;
use pretty_assertions::assert_eq;

fn manager() -> StateManager {
    StateManager::new(Storage::open_in_memory().unwrap()).unwrap()
}

const NAME: &str = "collectAzuredevopsBuilds";

// ============================================================================
// Run Lifecycle Tests
// ============================================================================

#[test]
fn test_start_run_inserts_incomplete_row() {
    let manager = manager();
    let id = manager.start_run(NAME, 1).unwrap();

    let run = manager.get_run(id).unwrap().unwrap();
    assert_eq!(run.subtask_name, NAME);
    assert_eq!(run.connection_id, 1);
    assert!(!run.is_completed());
    assert!(run.checkpointed_at.is_none());
    assert!(run.state.is_empty());
}

#[test]
fn test_run_ids_increase() {
    let manager = manager();
    let first = manager.start_run(NAME, 1).unwrap();
    let second = manager.start_run(NAME, 1).unwrap();
    assert!(second > first);
}

#[test]
fn test_start_run_refuses_open_transaction() {
    let manager = manager();
    manager.storage().begin().unwrap();
    assert!(manager.start_run(NAME, 1).is_err());
    manager.storage().rollback().unwrap();
}

#[test]
fn test_checkpoint_and_complete() {
    let manager = manager();
    let id = manager.start_run(NAME, 1).unwrap();

    manager
        .checkpoint(id, &State::new().with("minTime", "a"))
        .unwrap();
    let run = manager.get_run(id).unwrap().unwrap();
    assert!(run.checkpointed_at.is_some());
    assert!(!run.is_completed());
    assert_eq!(run.state.get_str("minTime"), Some("a"));

    manager
        .complete(id, &State::new().with("minTime", "b"))
        .unwrap();
    let run = manager.get_run(id).unwrap().unwrap();
    assert!(run.is_completed());
    assert_eq!(run.state.get_str("minTime"), Some("b"));
}

#[test]
fn test_unknown_run() {
    let manager = manager();
    assert!(manager.get_run(99).unwrap().is_none());
    assert!(manager.checkpoint(99, &State::new()).is_err());
    assert!(manager.complete(99, &State::new()).is_err());
}

#[test]
fn test_run_survives_rollback() {
    let manager = manager();
    let id = manager.start_run(NAME, 1).unwrap();

    manager.storage().begin().unwrap();
    manager
        .checkpoint(id, &State::new().with("minTime", "lost"))
        .unwrap();
    manager.storage().rollback().unwrap();

    let run = manager.get_run(id).unwrap().unwrap();
    assert!(run.state.is_empty());
    assert!(run.checkpointed_at.is_none());
}

// ============================================================================
// Resume State Tests
// ============================================================================

#[test]
fn test_resume_without_history_is_empty() {
    let manager = manager();
    let state = manager
        .resume_state(ResumeFrom::LastCompletedRun, NAME, 1, None)
        .unwrap();
    assert!(state.is_empty());
}

#[test]
fn test_resume_from_last_completed_run() {
    let manager = manager();
    let first = manager.start_run(NAME, 1).unwrap();
    manager.complete(first, &State::new().with("minTime", "t1")).unwrap();
    let second = manager.start_run(NAME, 1).unwrap();
    manager.complete(second, &State::new().with("minTime", "t2")).unwrap();

    let state = manager
        .resume_state(ResumeFrom::LastCompletedRun, NAME, 1, None)
        .unwrap();
    assert_eq!(state.get_str("minTime"), Some("t2"));
}

#[test]
fn test_failed_checkpoint_is_ignored_by_default() {
    let manager = manager();
    let done = manager.start_run(NAME, 1).unwrap();
    manager.complete(done, &State::new().with("minTime", "t1")).unwrap();
    let failed = manager.start_run(NAME, 1).unwrap();
    manager.checkpoint(failed, &State::new().with("minTime", "t2")).unwrap();

    let current = manager.start_run(NAME, 1).unwrap();
    let default = manager
        .resume_state(ResumeFrom::LastCompletedRun, NAME, 1, Some(current))
        .unwrap();
    assert_eq!(default.get_str("minTime"), Some("t1"));

    let opt_in = manager
        .resume_state(ResumeFrom::LastCheckpoint, NAME, 1, Some(current))
        .unwrap();
    assert_eq!(opt_in.get_str("minTime"), Some("t2"));
}

#[test]
fn test_resume_excludes_current_run() {
    let manager = manager();
    let current = manager.start_run(NAME, 1).unwrap();
    manager.checkpoint(current, &State::new().with("minTime", "x")).unwrap();

    let state = manager
        .resume_state(ResumeFrom::LastCheckpoint, NAME, 1, Some(current))
        .unwrap();
    assert!(state.is_empty());
}

#[test]
fn test_resume_is_scoped_by_name_and_connection() {
    let manager = manager();
    let other_conn = manager.start_run(NAME, 2).unwrap();
    manager.complete(other_conn, &State::new().with("minTime", "c2")).unwrap();
    let other_name = manager.start_run("collectAzuredevopsJobs", 1).unwrap();
    manager.complete(other_name, &State::new().with("minTime", "j")).unwrap();

    let state = manager
        .resume_state(ResumeFrom::LastCompletedRun, NAME, 1, None)
        .unwrap();
    assert!(state.is_empty());
}

#[test]
fn test_runs_newest_first() {
    let manager = manager();
    let a = manager.start_run(NAME, 1).unwrap();
    let b = manager.start_run(NAME, 1).unwrap();
    manager.start_run(NAME, 2).unwrap();

    let ids: Vec<i64> = manager.runs(NAME, 1).unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![b, a]);
}

#[test]
fn test_runs_table_is_shared_across_managers() {
    let storage = Storage::open_in_memory().unwrap();
    let first = StateManager::new(storage.clone()).unwrap();
    let id = first.start_run(NAME, 1).unwrap();

    let second = StateManager::new(storage).unwrap();
    assert!(second.get_run(id).unwrap().is_some());
}
