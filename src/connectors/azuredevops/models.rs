//! Azure DevOps API payloads and tool models
//!
//! `Api*` types mirror the REST payloads and are only used during extract;
//! [`Build`] and [`Job`] are what the tool tables hold.

use crate::domain::{CicdEnvironment, CicdResult, CicdStatus, CicdType};
use crate::error::{Error, Result};
use crate::model::ToolModel;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// API payloads
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiLink {
    pub href: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiLinks {
    #[serde(default)]
    pub web: ApiLink,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiDefinition {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiRepository {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// A build as returned by `_apis/build/builds`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBuild {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub queue_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "start_time")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "finish_time")]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub definition: ApiDefinition,
    #[serde(default)]
    pub trigger_info: HashMap<String, String>,
    #[serde(default, rename = "_links")]
    pub links: ApiLinks,
    #[serde(default)]
    pub source_branch: Option<String>,
    #[serde(default)]
    pub source_version: Option<String>,
    #[serde(default)]
    pub repository: ApiRepository,
    #[serde(default)]
    pub deleted: bool,
}

/// A record of a build timeline
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTimelineRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    /// Domain id of the owning pipeline, added at collect time
    #[serde(rename = "build_id")]
    pub build_id: String,
    #[serde(default, alias = "start_time")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "finish_time")]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

// ============================================================================
// Tool models
// ============================================================================

/// A pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: u64,
    /// Pipeline definition name
    pub name: String,
    pub status: String,
    pub result: Option<String>,
    pub queue_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub source_branch: Option<String>,
    pub source_version: Option<String>,
    pub repository_id: Option<String>,
    pub repository_type: Option<String>,
    /// Commit message that triggered the run
    pub display_title: Option<String>,
    /// Web page of the run
    pub url: Option<String>,
}

impl ToolModel for Build {
    const TABLE: &'static str = "_tool_azuredevops_builds";
    const TYPE_NAME: &'static str = "Build";

    fn primary_key(&self) -> Vec<String> {
        vec![self.id.to_string()]
    }
}

impl From<ApiBuild> for Build {
    fn from(build: ApiBuild) -> Self {
        let display_title = build.trigger_info.get("ci.message").cloned();
        Self {
            id: build.id,
            name: build.definition.name,
            status: build.status,
            result: build.result,
            queue_time: build.queue_time,
            start_time: build.start_time,
            finish_time: build.finish_time,
            source_branch: build.source_branch,
            source_version: build.source_version,
            repository_id: build.repository.id,
            repository_type: build.repository.kind,
            display_title,
            url: build.links.web.href,
        }
    }
}

/// A job or stage of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Domain id of the owning pipeline
    pub build_id: String,
    /// `Job` or `Stage`
    pub kind: String,
    pub name: String,
    pub state: Option<String>,
    pub result: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
}

impl ToolModel for Job {
    const TABLE: &'static str = "_tool_azuredevops_jobs";
    const TYPE_NAME: &'static str = "Job";

    /// Timeline record ids repeat across runs of one pipeline
    fn primary_key(&self) -> Vec<String> {
        vec![self.build_id.clone(), self.id.clone()]
    }
}

impl From<ApiTimelineRecord> for Job {
    fn from(record: ApiTimelineRecord) -> Self {
        Self {
            id: record.id,
            build_id: record.build_id,
            kind: record.kind,
            name: record.name,
            state: record.state,
            result: record.result,
            start_time: record.start_time,
            finish_time: record.finish_time,
        }
    }
}

// ============================================================================
// Status mapping
// ============================================================================

pub fn build_status(status: &str) -> CicdStatus {
    match status {
        "completed" | "cancelling" => CicdStatus::Done,
        "inProgress" | "notStarted" | "postponed" => CicdStatus::InProgress,
        _ => CicdStatus::Other,
    }
}

pub fn build_result(result: &str) -> Option<CicdResult> {
    match result {
        "succeeded" | "partiallySucceeded" => Some(CicdResult::Success),
        "failed" => Some(CicdResult::Failure),
        "canceled" => Some(CicdResult::Abort),
        _ => None,
    }
}

pub fn job_status(state: &str) -> CicdStatus {
    match state {
        "completed" => CicdStatus::Done,
        "inProgress" | "pending" => CicdStatus::InProgress,
        _ => CicdStatus::Other,
    }
}

pub fn job_result(result: &str) -> Option<CicdResult> {
    match result {
        "succeeded" | "succeededWithIssues" => Some(CicdResult::Success),
        "failed" => Some(CicdResult::Failure),
        "canceled" | "abandoned" => Some(CicdResult::Abort),
        _ => None,
    }
}

// ============================================================================
// Scope config
// ============================================================================

/// Per-scope classification rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureScopeConfig {
    /// Names matching this are deployments
    #[serde(default)]
    pub deployment_pattern: Option<String>,

    /// Environment names matching this are production
    #[serde(default)]
    pub production_pattern: Option<String>,

    /// Extracts the environment name from a job name (first capture group)
    #[serde(default)]
    pub environment_pattern: Option<String>,
}

impl AzureScopeConfig {
    /// Compile the patterns; empty patterns are ignored
    pub fn compile(&self) -> Result<Classifier> {
        Ok(Classifier {
            deployment: compile("deployment_pattern", self.deployment_pattern.as_deref())?,
            production: compile("production_pattern", self.production_pattern.as_deref())?,
            environment: compile("environment_pattern", self.environment_pattern.as_deref())?,
        })
    }
}

fn compile(field: &str, pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern.filter(|p| !p.is_empty()) {
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| Error::invalid_value(field, e.to_string())),
        None => Ok(None),
    }
}

/// Compiled [`AzureScopeConfig`]
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    deployment: Option<Regex>,
    production: Option<Regex>,
    environment: Option<Regex>,
}

impl Classifier {
    /// Deployment when the name matches the deployment pattern, build otherwise
    pub fn kind(&self, name: &str) -> CicdType {
        match &self.deployment {
            Some(re) if re.is_match(name) => CicdType::Deployment,
            _ => CicdType::Build,
        }
    }

    /// Production when the environment name matches the production pattern.
    ///
    /// Without a matching environment pattern the whole name is used.
    pub fn environment(&self, name: &str) -> Option<CicdEnvironment> {
        let env = self
            .environment
            .as_ref()
            .and_then(|re| re.captures(name))
            .and_then(|caps| caps.get(1))
            .map_or(name, |m| m.as_str());
        match &self.production {
            Some(re) if re.is_match(env) => Some(CicdEnvironment::Production),
            _ => None,
        }
    }
}
