//! Builds and jobs streams

use super::api::{AzureDevOpsApi, RepoScope};
use super::models::{
    build_result, build_status, job_result, job_status, ApiBuild, ApiTimelineRecord,
    AzureScopeConfig, Build, Classifier, Job,
};
use super::{scope_domain_id, PLUGIN};
use crate::context::Context;
use crate::domain::{duration_sec, CicdPipeline, CicdPipelineCommit, CicdTask};
use crate::error::{Error, Result};
use crate::model::{domain_id, DomainRecord, ToolModel};
use crate::state::State;
use crate::stream::{CollectStream, RawItem, Stream, Substream};
use crate::types::{capitalize, DomainType, JsonValue};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

/// State key holding the finish time of the last collected build
pub const MIN_TIME: &str = "minTime";

fn classifier(ctx: &Context) -> Result<Classifier> {
    ctx.scope_config::<AzureScopeConfig>()?.compile()
}

// ============================================================================
// Builds
// ============================================================================

/// Pipeline runs of a repository
#[derive(Debug, Clone, Copy, Default)]
pub struct Builds;

#[async_trait]
impl Stream for Builds {
    type Tool = Build;

    fn name(&self) -> &str {
        "builds"
    }

    fn domain_types(&self) -> Vec<DomainType> {
        vec![DomainType::Cicd]
    }

    /// Resumes from the last seen finish time; the build at that instant is
    /// collected again and overwritten at extract.
    fn collect<'a>(&'a self, state: State, ctx: &'a Context) -> CollectStream<'a> {
        stream::once(async move {
            let repo = RepoScope::resolve(&ctx.scope, &ctx.connection)?;
            let api = AzureDevOpsApi::new(&ctx.connection, &ctx.http)?;
            let paged = api.builds(&repo, state.get_str(MIN_TIME)).await?;
            let url = paged.first().request.url.clone();

            let mut state = state;
            let items = paged.items().map_ok(move |build| {
                if let Some(finished) = build.get("finishTime").and_then(JsonValue::as_str) {
                    state.set(MIN_TIME, finished);
                }
                (RawItem::new(build).with_url(url.clone()), state.clone())
            });
            Ok::<_, Error>(items)
        })
        .try_flatten()
        .boxed()
    }

    fn extract(&self, raw: JsonValue) -> Result<Option<Build>> {
        let build: ApiBuild = serde_json::from_value(raw)?;
        if build.deleted {
            debug!(build_id = build.id, "Dropping deleted build");
            return Ok(None);
        }
        Ok(Some(build.into()))
    }

    async fn convert(&self, build: &Build, ctx: &Context) -> Result<Vec<DomainRecord>> {
        let classifier = classifier(ctx)?;
        let scope_id = scope_domain_id(ctx);

        let pipeline = CicdPipeline {
            name: build.name.clone(),
            status: build_status(&build.status),
            result: build.result.as_deref().and_then(build_result),
            original_status: capitalize(&build.status),
            original_result: build.result.as_deref().map(capitalize),
            kind: Some(classifier.kind(&build.name)),
            environment: classifier.environment(&build.name),
            created_date: build.queue_time,
            queued_date: build.queue_time,
            started_date: build.start_time,
            finished_date: build.finish_time,
            duration_sec: duration_sec(build.start_time, build.finish_time),
            cicd_scope_id: scope_id.clone(),
            display_title: build.display_title.clone(),
            url: build.url.clone(),
        };
        let mut records = vec![DomainRecord::new(&pipeline)?];

        if let Some(sha) = &build.source_version {
            let commit = CicdPipelineCommit {
                pipeline_id: domain_id(
                    PLUGIN,
                    Build::TYPE_NAME,
                    ctx.connection.id,
                    &build.primary_key(),
                ),
                commit_sha: sha.clone(),
                branch: build.source_branch.clone().unwrap_or_default(),
                repo_id: scope_id,
                repo_url: ctx.scope.get_str("url").map(str::to_string),
                display_title: build.display_title.clone(),
                url: build.url.clone(),
            };
            records.push(DomainRecord::new(&commit)?);
        }
        Ok(records)
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// Jobs and stages of each collected build
#[derive(Debug, Clone, Copy, Default)]
pub struct Jobs;

#[async_trait]
impl Substream for Jobs {
    type Tool = Job;
    type Parent = Build;

    fn name(&self) -> &str {
        "jobs"
    }

    fn parent_stream(&self) -> &str {
        "builds"
    }

    fn domain_types(&self) -> Vec<DomainType> {
        vec![DomainType::Cicd]
    }

    fn collect<'a>(&'a self, state: State, ctx: &'a Context, parent: Build) -> CollectStream<'a> {
        stream::once(async move {
            let repo = RepoScope::resolve(&ctx.scope, &ctx.connection)?;
            let api = AzureDevOpsApi::new(&ctx.connection, &ctx.http)?;
            let (url, records) = api.timeline(&repo, parent.id).await?;
            let build_id = domain_id(
                PLUGIN,
                Build::TYPE_NAME,
                ctx.connection.id,
                &parent.primary_key(),
            );

            let items: Vec<Result<(RawItem, State)>> = records
                .into_iter()
                .filter(|record| {
                    matches!(
                        record.get("type").and_then(JsonValue::as_str),
                        Some("Job" | "Stage")
                    )
                })
                .map(|mut record| {
                    if let Some(fields) = record.as_object_mut() {
                        fields.insert("build_id".to_string(), JsonValue::String(build_id.clone()));
                    }
                    Ok((RawItem::new(record).with_url(url.clone()), state.clone()))
                })
                .collect();
            Ok::<_, Error>(stream::iter(items))
        })
        .try_flatten()
        .boxed()
    }

    fn extract(&self, raw: JsonValue) -> Result<Option<Job>> {
        let record: ApiTimelineRecord = serde_json::from_value(raw)?;
        Ok(Some(record.into()))
    }

    async fn convert(&self, job: &Job, ctx: &Context) -> Result<Vec<DomainRecord>> {
        let classifier = classifier(ctx)?;
        let state = job.state.as_deref().unwrap_or_default();

        let task = CicdTask {
            name: job.name.clone(),
            pipeline_id: job.build_id.clone(),
            status: job_status(state),
            result: job.result.as_deref().and_then(job_result),
            original_status: capitalize(state),
            original_result: job.result.as_deref().map(capitalize),
            kind: Some(classifier.kind(&job.name)),
            environment: classifier.environment(&job.name),
            created_date: job.start_time,
            started_date: job.start_time,
            finished_date: job.finish_time,
            duration_sec: duration_sec(job.start_time, job.finish_time),
            cicd_scope_id: scope_domain_id(ctx),
        };
        Ok(vec![DomainRecord::new(&task)?])
    }
}
