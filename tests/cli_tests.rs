//! Tests for the `devlake-etl` binary

use pretty_assertions::assert_eq;
use serde_json::Value;
use std::process::{Command, Output};

fn devlake_etl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_devlake-etl"))
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_subtasks_prints_json_message() {
    let output = devlake_etl(&["subtasks", "--plugin", "azuredevops"]);
    assert!(output.status.success());

    let message: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(message["type"], "SUBTASKS");
    assert_eq!(message["subtasks"].as_array().unwrap().len(), 6);
}

#[test]
fn test_failure_exits_nonzero_with_cause() {
    let output = devlake_etl(&["subtasks", "--plugin", "gitlab"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("devlake-etl subtasks failed"), "{stderr}");
    assert!(stderr.contains("Unknown plugin: gitlab"), "{stderr}");
}
