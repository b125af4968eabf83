//! CLI module
//!
//! Command-line interface for running plugins.
//!
//! # Commands
//!
//! - `run` - Run collect / extract / convert subtasks for one scope
//! - `subtasks` - List a plugin's subtasks
//! - `plan` - Build a pipeline plan for a set of scopes
//! - `runs` - Show recorded subtask runs
//! - `list` - List built-in plugins
//! - `check` - Test a connection

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
