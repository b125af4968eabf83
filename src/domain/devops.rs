//! CI/CD domain models

use crate::model::DomainModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CicdStatus {
    InProgress,
    Done,
    Other,
}

/// Normalized run result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CicdResult {
    Success,
    Failure,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CicdType {
    Build,
    Deployment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CicdEnvironment {
    Production,
    Staging,
    Testing,
}

/// Seconds between two instants, when both are known
pub fn duration_sec(start: Option<DateTime<Utc>>, finish: Option<DateTime<Utc>>) -> Option<f64> {
    let (start, finish) = (start?, finish?);
    let micros = (finish - start).num_microseconds()?;
    Some(micros as f64 / 1_000_000.0)
}

/// One pipeline (build) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CicdPipeline {
    pub name: String,
    pub status: CicdStatus,
    pub result: Option<CicdResult>,
    pub original_status: String,
    pub original_result: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<CicdType>,
    pub environment: Option<CicdEnvironment>,
    pub created_date: Option<DateTime<Utc>>,
    pub queued_date: Option<DateTime<Utc>>,
    pub started_date: Option<DateTime<Utc>>,
    pub finished_date: Option<DateTime<Utc>>,
    pub duration_sec: Option<f64>,
    pub cicd_scope_id: String,
    pub display_title: Option<String>,
    pub url: Option<String>,
}

impl DomainModel for CicdPipeline {
    const TABLE: &'static str = "cicd_pipelines";
}

/// One job or stage of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CicdTask {
    pub name: String,
    pub pipeline_id: String,
    pub status: CicdStatus,
    pub result: Option<CicdResult>,
    pub original_status: String,
    pub original_result: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<CicdType>,
    pub environment: Option<CicdEnvironment>,
    pub created_date: Option<DateTime<Utc>>,
    pub started_date: Option<DateTime<Utc>>,
    pub finished_date: Option<DateTime<Utc>>,
    pub duration_sec: Option<f64>,
    pub cicd_scope_id: String,
}

impl DomainModel for CicdTask {
    const TABLE: &'static str = "cicd_tasks";
}

/// Link between a pipeline and the commit it ran on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CicdPipelineCommit {
    pub pipeline_id: String,
    pub commit_sha: String,
    pub branch: String,
    pub repo_id: String,
    pub repo_url: Option<String>,
    pub display_title: Option<String>,
    pub url: Option<String>,
}

impl DomainModel for CicdPipelineCommit {
    const TABLE: &'static str = "cicd_pipeline_commits";

    fn key(&self) -> Option<Vec<String>> {
        Some(vec![self.pipeline_id.clone(), self.commit_sha.clone()])
    }
}
