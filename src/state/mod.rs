//! State management module
//!
//! Handles checkpointing and resumability of subtasks.
//!
//! # Overview
//!
//! The state module provides:
//! - `State` - opaque per-subtask checkpoint map owned by the stream
//! - `SubtaskRun` - one row of the `_devlake_subtask_runs` table
//! - `StateManager` - run bookkeeping and resume-state lookup over storage

mod manager;
mod types;

pub use manager::{StateManager, SUBTASK_RUNS_TABLE};
pub use types::{State, SubtaskRun};

#[cfg(test)]
mod manager_tests;
