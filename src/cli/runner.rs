//! CLI runner - executes commands
//!
//! Every command writes line-delimited JSON messages to stdout, each tagged
//! with a `type`. Logs go to stderr.

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::EtlConfig;
use crate::connectors::{get_builtin, list_builtin};
use crate::context::ContextSpec;
use crate::context::Context;
use crate::engine::{subtask_name, Progress, RunSummary, SubtaskRunner};
use crate::error::{Error, Result};
use crate::plugin::BlueprintScope;
use crate::state::StateManager;
use crate::storage::Storage;
use crate::types::{JsonValue, Phase};
use serde_json::json;
use std::fs;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let messages = match &self.cli.command {
            Commands::Run {
                plugin,
                stream,
                phase,
                context,
                incremental,
            } => {
                self.run_subtasks(plugin, stream.as_deref(), *phase, context, *incremental)
                    .await?
            }
            Commands::Subtasks { plugin } => vec![self.subtasks(plugin)?],
            Commands::Plan { plugin, scopes } => vec![self.plan(plugin, scopes)?],
            Commands::Runs {
                subtask,
                connection_id,
            } => vec![self.runs(subtask, *connection_id)?],
            Commands::List => vec![self.list_connectors()?],
            Commands::Check { plugin, context } => vec![self.check(plugin, context).await?],
        };

        for message in &messages {
            emit(self.cli.format, message);
        }
        Ok(())
    }

    /// Load the config file, then apply command-line overrides
    fn load_config(&self) -> Result<EtlConfig> {
        let mut config = match &self.cli.config {
            Some(path) => EtlConfig::load(path)?,
            None => EtlConfig::default(),
        };
        if let Some(database) = &self.cli.database {
            config.database.path = database.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn open_storage(config: &EtlConfig) -> Result<Storage> {
        debug!(path = %config.database.path.display(), "Opening database");
        Storage::open(&config.database.path)
    }

    /// Run subtasks, streaming progress while they execute
    async fn run_subtasks(
        &self,
        plugin_name: &str,
        stream: Option<&str>,
        phase: Option<Phase>,
        context: &str,
        incremental: bool,
    ) -> Result<Vec<JsonValue>> {
        let config = self.load_config()?;
        let plugin = get_builtin(plugin_name)?.plugin()?;
        let spec = ContextSpec::from_json(&read_arg(context)?)?;
        let storage = Self::open_storage(&config)?;
        let mut ctx = spec.into_context(storage, config.http.clone());
        ctx.options.incremental |= incremental;

        let streams: Vec<String> = match stream {
            Some(name) => vec![plugin.get_stream(name)?.name().to_string()],
            None => plugin.streams().map(|s| s.name().to_string()).collect(),
        };
        let phases = phase.map_or_else(|| Phase::ALL.to_vec(), |p| vec![p]);

        let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
        let format = self.cli.format;
        let printer = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                emit(format, &json!({"type": "PROGRESS", "progress": progress}));
            }
        });

        let runner = SubtaskRunner::new(config.runner.clone()).with_progress(tx);
        info!(
            plugin = plugin.name(),
            partition = %ctx.partition(),
            incremental = ctx.options.incremental,
            "Running subtasks"
        );

        let mut summaries: Vec<RunSummary> = Vec::new();
        let mut outcome = Ok(());
        'streams: for stream in &streams {
            for phase in &phases {
                match plugin.run(&runner, &ctx, stream, *phase).await {
                    Ok(summary) => summaries.push(summary),
                    Err(e) => {
                        let name = subtask_name(*phase, plugin.name(), stream);
                        match failed_summary(&ctx, &name) {
                            Ok(Some(summary)) => summaries.push(summary),
                            Ok(None) => {}
                            Err(lookup) => debug!(error = %lookup, "Could not look up the failed run"),
                        }
                        outcome = Err(e);
                        break 'streams;
                    }
                }
            }
        }

        // Closing the channel lets the printer drain and stop
        drop(runner);
        if let Err(e) = printer.await {
            debug!(error = %e, "Progress printer stopped abnormally");
        }

        let mut messages: Vec<JsonValue> = summaries
            .iter()
            .map(|summary| json!({"type": "SUMMARY", "summary": summary}))
            .collect();
        if let Err(e) = outcome {
            // Report what ran, including the failed run
            for message in &messages {
                emit(format, message);
            }
            return Err(e);
        }
        messages.push(json!({
            "type": "RUN_COMPLETE",
            "plugin": plugin.name(),
            "subtasks": summaries.len(),
        }));
        Ok(messages)
    }

    /// List the subtasks of a plugin
    fn subtasks(&self, plugin_name: &str) -> Result<JsonValue> {
        let plugin = get_builtin(plugin_name)?.plugin()?;
        Ok(json!({
            "type": "SUBTASKS",
            "plugin": plugin.name(),
            "subtasks": plugin.subtasks(),
        }))
    }

    /// Build the pipeline plan for the given scopes
    fn plan(&self, plugin_name: &str, scopes: &str) -> Result<JsonValue> {
        let plugin = get_builtin(plugin_name)?.plugin()?;
        let scopes: Vec<BlueprintScope> = serde_json::from_str(&read_arg(scopes)?)
            .map_err(|e| Error::config(format!("Invalid scopes JSON: {e}")))?;
        Ok(json!({
            "type": "PIPELINE_PLAN",
            "plan": plugin.make_pipeline(&scopes),
        }))
    }

    /// Recorded runs of a subtask
    fn runs(&self, subtask: &str, connection_id: i64) -> Result<JsonValue> {
        let config = self.load_config()?;
        let manager = StateManager::new(Self::open_storage(&config)?)?;
        Ok(json!({
            "type": "SUBTASK_RUNS",
            "subtask": subtask,
            "connection_id": connection_id,
            "runs": manager.runs(subtask, connection_id)?,
        }))
    }

    /// List built-in connectors
    fn list_connectors(&self) -> Result<JsonValue> {
        let connectors = list_builtin()
            .into_iter()
            .map(|name| {
                let connector = get_builtin(name)?;
                let plugin = connector.plugin()?;
                let streams: Vec<&str> = plugin.streams().map(|s| s.name()).collect();
                Ok(json!({
                    "name": connector.name(),
                    "description": connector.description(),
                    "streams": streams,
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(json!({
            "type": "CONNECTORS",
            "connectors": connectors,
        }))
    }

    /// Check a connection
    async fn check(&self, plugin_name: &str, context: &str) -> Result<JsonValue> {
        let config = self.load_config()?;
        let connector = get_builtin(plugin_name)?;
        let spec: JsonValue = serde_json::from_str(&read_arg(context)?)
            .map_err(|e| Error::config(format!("Invalid context JSON: {e}")))?;
        let connection = spec
            .get("connection")
            .cloned()
            .ok_or_else(|| Error::missing_field("connection"))?;
        let connection = serde_json::from_value(connection)
            .map_err(|e| Error::config(format!("Invalid connection: {e}")))?;

        let result = connector.check(&connection, &config.http).await?;
        let status = if result.success { "SUCCEEDED" } else { "FAILED" };
        Ok(json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": {
                "status": status,
                "message": result.message.unwrap_or_else(|| "Connection successful".to_string()),
            }
        }))
    }
}

/// Summary of the newest run of `subtask` when it did not complete
fn failed_summary(ctx: &Context, subtask: &str) -> Result<Option<RunSummary>> {
    let manager = StateManager::new(ctx.storage.clone())?;
    let newest = manager.runs(subtask, ctx.connection.id)?.into_iter().next();
    Ok(newest
        .filter(|run| !run.is_completed())
        .map(|run| RunSummary::failed(&run)))
}

/// Inline argument, or the contents of `@path`
fn read_arg(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound {
                path: path.to_string(),
            },
            _ => Error::Io(e),
        }),
        None => Ok(value.to_string()),
    }
}

/// Write one message to stdout
fn emit(format: OutputFormat, msg: &JsonValue) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(msg).unwrap_or_default());
        }
        OutputFormat::Pretty => {
            println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
        }
    }
}
