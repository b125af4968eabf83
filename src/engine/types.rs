//! Engine types
//!
//! Progress events, run outcomes and subtask naming.

use crate::state::{State, SubtaskRun};
use chrono::Utc;
use crate::types::{capitalize, Phase};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subtask name: `<verb><Plugin><Stream>`, e.g. `collectAzuredevopsBuilds`
pub fn subtask_name(phase: Phase, plugin: &str, stream: &str) -> String {
    format!("{}{}{}", phase.verb(), capitalize(plugin), capitalize(stream))
}

/// Human-readable description, e.g. `Collect azuredevops builds`
pub fn subtask_description(phase: Phase, plugin: &str, stream: &str) -> String {
    format!(
        "{} {} {}",
        capitalize(phase.verb()),
        plugin,
        stream.to_lowercase()
    )
}

/// Progress event emitted at every checkpoint and at completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Subtask name
    pub subtask: String,
    /// Items processed since the previous event
    pub increment: u64,
    /// Items processed so far
    pub current: u64,
    /// Expected item count, when known up front
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Lifecycle of a subtask run, from the moment its row is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    /// The stream does not apply to the scope
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of a finished subtask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub subtask: String,
    /// Row id in the subtask run table; `None` when skipped
    pub run_id: Option<i64>,
    pub status: RunStatus,
    /// Items processed
    pub processed: u64,
    /// Final state
    pub state: State,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    /// Summary of a subtask that did not apply
    pub fn skipped(subtask: impl Into<String>) -> Self {
        Self {
            subtask: subtask.into(),
            run_id: None,
            status: RunStatus::Skipped,
            processed: 0,
            state: State::new(),
            duration_ms: 0,
        }
    }

    /// Summary of a recorded run that stopped on an error.
    ///
    /// The state is the run's last checkpoint. Items are not counted for
    /// failed runs, so `processed` is zero.
    pub fn failed(run: &SubtaskRun) -> Self {
        let elapsed = Utc::now() - run.started;
        Self {
            subtask: run.subtask_name.clone(),
            run_id: Some(run.id),
            status: RunStatus::Failed,
            processed: 0,
            state: run.state.clone(),
            duration_ms: elapsed.num_milliseconds().max(0) as u64,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
