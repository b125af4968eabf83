//! CLI commands and argument parsing

use crate::types::Phase;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DevLake ETL runner for built-in data-source plugins
#[derive(Parser, Debug)]
#[command(name = "devlake-etl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Runtime configuration file (YAML or JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// DuckDB database file, overrides `database.path` of the config file
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run subtasks of a plugin for one connection and scope
    Run {
        /// Plugin name
        #[arg(short, long)]
        plugin: String,

        /// Stream to run (empty = every stream, in registration order)
        #[arg(short, long)]
        stream: Option<String>,

        /// Phase to run (empty = collect, extract and convert)
        #[arg(long, value_enum)]
        phase: Option<Phase>,

        /// Context JSON (`connection`, `scope`, `scope_config`), or `@file`
        #[arg(long)]
        context: String,

        /// Resume from the previous run instead of refreshing the partition
        #[arg(long)]
        incremental: bool,
    },

    /// List the subtasks of a plugin
    Subtasks {
        /// Plugin name
        #[arg(short, long)]
        plugin: String,
    },

    /// Build the pipeline plan for a set of scopes
    Plan {
        /// Plugin name
        #[arg(short, long)]
        plugin: String,

        /// Scopes JSON (`[{"id": .., "name": ..}]`), or `@file`
        #[arg(long)]
        scopes: String,
    },

    /// Show recorded runs of a subtask, newest first
    Runs {
        /// Subtask name, e.g. `collectAzuredevopsBuilds`
        #[arg(long)]
        subtask: String,

        /// Connection id
        #[arg(long)]
        connection_id: i64,
    },

    /// List built-in plugins
    List,

    /// Test a connection
    Check {
        /// Plugin name
        #[arg(short, long)]
        plugin: String,

        /// Context JSON, or `@file`; only `connection` is used
        #[arg(long)]
        context: String,
    },
}

impl Commands {
    /// Subcommand name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Subtasks { .. } => "subtasks",
            Self::Plan { .. } => "plan",
            Self::Runs { .. } => "runs",
            Self::List => "list",
            Self::Check { .. } => "check",
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "devlake-etl",
            "--database",
            "lake.duckdb",
            "run",
            "--plugin",
            "azuredevops",
            "--stream",
            "builds",
            "--phase",
            "collect",
            "--context",
            "@ctx.json",
            "--incremental",
        ])
        .unwrap();

        assert_eq!(cli.database, Some(PathBuf::from("lake.duckdb")));
        match cli.command {
            Commands::Run {
                plugin,
                stream,
                phase,
                context,
                incremental,
            } => {
                assert_eq!(plugin, "azuredevops");
                assert_eq!(stream.as_deref(), Some("builds"));
                assert_eq!(phase, Some(Phase::Collect));
                assert_eq!(context, "@ctx.json");
                assert!(incremental);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["devlake-etl", "list", "--verbose", "-f", "pretty"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Pretty);
    }

    #[test]
    fn test_command_names() {
        let cli = Cli::try_parse_from(["devlake-etl", "subtasks", "-p", "azuredevops"]).unwrap();
        assert_eq!(cli.command.name(), "subtasks");
        let cli = Cli::try_parse_from(["devlake-etl", "list"]).unwrap();
        assert_eq!(cli.command.name(), "list");
    }

    #[test]
    fn test_runs_requires_connection_id() {
        assert!(Cli::try_parse_from(["devlake-etl", "runs", "--subtask", "x"]).is_err());
    }
}
