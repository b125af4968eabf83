//! Plugin registry
//!
//! A [`Plugin`] is a named, ordered set of streams. It answers the questions
//! an orchestrator asks (which subtasks exist, what pipeline runs a set of
//! scopes) and dispatches runs to the [`SubtaskRunner`].

use crate::context::Context;
use crate::engine::{subtask_description, subtask_name, RunSummary, SubtaskRunner};
use crate::error::{Error, Result};
use crate::stream::{AnyStream, Stream, StreamAdapter, Substream, SubstreamAdapter};
use crate::types::{DomainType, JsonObject, Phase};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// Orchestration messages
// ============================================================================

/// Description of one subtask for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskMeta {
    pub name: String,
    /// Phase verb the subtask is dispatched with
    pub entry_point_name: String,
    /// Arguments of the entry point (the stream name)
    pub arguments: Vec<String>,
    pub required: bool,
    pub enabled_by_default: bool,
    pub description: String,
    pub domain_types: Vec<DomainType>,
}

/// A scope selected in a blueprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintScope {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    pub plugin: String,
    pub skip_on_fail: bool,
    pub subtasks: Vec<String>,
    pub options: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub tasks: Vec<PipelineTask>,
}

/// Stages run in order; tasks of a stage may run in parallel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub stages: Vec<PipelineStage>,
}

// ============================================================================
// Plugin
// ============================================================================

/// A data-source plugin: its streams in registration order
#[derive(Clone)]
pub struct Plugin {
    name: String,
    description: String,
    streams: Vec<Arc<dyn AnyStream>>,
}

impl Plugin {
    /// Start building a plugin
    pub fn builder(name: impl Into<String>) -> PluginBuilder {
        let name = name.into();
        PluginBuilder {
            description: format!("{name} plugin"),
            name,
            streams: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Streams in registration order
    pub fn streams(&self) -> impl Iterator<Item = &dyn AnyStream> {
        self.streams.iter().map(AsRef::as_ref)
    }

    /// Look up a stream by name
    pub fn get_stream(&self, name: &str) -> Result<&dyn AnyStream> {
        self.streams()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::unknown_stream(&self.name, name))
    }

    /// Every subtask: collect, extract and convert of each stream in order
    pub fn subtasks(&self) -> Vec<SubtaskMeta> {
        self.streams()
            .flat_map(|stream| {
                Phase::ALL.into_iter().map(move |phase| SubtaskMeta {
                    name: subtask_name(phase, &self.name, stream.name()),
                    entry_point_name: phase.verb().to_string(),
                    arguments: vec![stream.name().to_string()],
                    required: true,
                    enabled_by_default: true,
                    description: subtask_description(phase, &self.name, stream.name()),
                    domain_types: stream.domain_types(),
                })
            })
            .collect()
    }

    /// One stage per scope, each running every subtask of the plugin
    pub fn make_pipeline(&self, scopes: &[BlueprintScope]) -> PipelinePlan {
        let subtasks: Vec<String> = self.subtasks().into_iter().map(|s| s.name).collect();
        let stages = scopes
            .iter()
            .map(|scope| {
                let mut options = JsonObject::new();
                options.insert("scopeId".to_string(), json!(scope.id));
                options.insert("scopeName".to_string(), json!(scope.name));
                PipelineStage {
                    tasks: vec![PipelineTask {
                        plugin: self.name.clone(),
                        skip_on_fail: false,
                        subtasks: subtasks.clone(),
                        options,
                    }],
                }
            })
            .collect();
        PipelinePlan { stages }
    }

    /// Run one phase of a stream
    pub async fn run(
        &self,
        runner: &SubtaskRunner,
        ctx: &Context,
        stream: &str,
        phase: Phase,
    ) -> Result<RunSummary> {
        let stream = self.get_stream(stream)?;
        runner.run(stream, ctx, phase).await
    }

    pub async fn collect(&self, runner: &SubtaskRunner, ctx: &Context, stream: &str) -> Result<RunSummary> {
        self.run(runner, ctx, stream, Phase::Collect).await
    }

    pub async fn extract(&self, runner: &SubtaskRunner, ctx: &Context, stream: &str) -> Result<RunSummary> {
        self.run(runner, ctx, stream, Phase::Extract).await
    }

    pub async fn convert(&self, runner: &SubtaskRunner, ctx: &Context, stream: &str) -> Result<RunSummary> {
        self.run(runner, ctx, stream, Phase::Convert).await
    }

    /// Run every subtask of every stream in order, stopping at the first failure
    pub async fn run_all(&self, runner: &SubtaskRunner, ctx: &Context) -> Result<Vec<RunSummary>> {
        let mut summaries = Vec::new();
        for stream in self.streams() {
            for phase in Phase::ALL {
                summaries.push(runner.run(stream, ctx, phase).await?);
            }
        }
        Ok(summaries)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let streams: Vec<&str> = self.streams().map(AnyStream::name).collect();
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("streams", &streams)
            .finish()
    }
}

/// Builder for [`Plugin`]
pub struct PluginBuilder {
    name: String,
    description: String,
    streams: Vec<Arc<dyn AnyStream>>,
}

impl PluginBuilder {
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Register a top-level stream
    #[must_use]
    pub fn stream<S: Stream>(mut self, stream: S) -> Self {
        self.streams
            .push(Arc::new(StreamAdapter::new(self.name.clone(), stream)));
        self
    }

    /// Register a substream; its parent must be registered before it
    #[must_use]
    pub fn substream<S: Substream>(mut self, stream: S) -> Self {
        self.streams
            .push(Arc::new(SubstreamAdapter::new(self.name.clone(), stream)));
        self
    }

    /// Validate stream names and parent ordering
    pub fn build(self) -> Result<Plugin> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut tool_tables: Vec<(&str, &'static str)> = Vec::new();
        for stream in &self.streams {
            if !seen.insert(stream.name()) {
                return Err(Error::config(format!(
                    "plugin '{}' registers stream '{}' twice",
                    self.name,
                    stream.name()
                )));
            }
            if let Some(parent) = stream.parent_stream() {
                match tool_tables.iter().find(|(name, _)| *name == parent) {
                    Some((_, table)) if Some(*table) == stream.parent_table() => {}
                    Some(_) => {
                        return Err(Error::config(format!(
                            "substream '{}' expects a different tool model for parent '{parent}'",
                            stream.name()
                        )))
                    }
                    None => {
                        return Err(Error::config(format!(
                            "substream '{}' must be registered after its parent '{parent}'",
                            stream.name()
                        )))
                    }
                }
            }
            tool_tables.push((stream.name(), stream.tool_table()));
        }

        Ok(Plugin {
            name: self.name,
            description: self.description,
            streams: self.streams,
        })
    }
}
