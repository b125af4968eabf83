//! Tests for the Azure DevOps connector

use super::*;
use crate::connectors::Connector;
use crate::context::Scope;
use crate::domain::{
    CicdEnvironment, CicdPipeline, CicdPipelineCommit, CicdResult, CicdStatus, CicdTask, CicdType,
};
use crate::state::State;
use crate::storage::Storage;
use crate::stream::{Stream, Substream};
use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde_json::json;
use test_case::test_case;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUILDS_PATH: &str = "/testorg/test-project/_apis/build/builds";
const WEB_URL: &str = "https://dev.azure.com/linweihoumerico-lake/e8af9e7b-d4bf-4afd-9d0a-c9f8dfac1d59/_build/results?buildId=15";

fn at(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn scope_config(environment_pattern: Option<&str>) -> JsonObject {
    let mut config = JsonObject::new();
    config.insert("deployment_pattern".to_string(), json!("deploy"));
    config.insert("production_pattern".to_string(), json!("prod"));
    if let Some(pattern) = environment_pattern {
        config.insert("environment_pattern".to_string(), json!(pattern));
    }
    config
}

fn context(endpoint: &str) -> Context {
    let connection = Connection::new(1)
        .with_token("token")
        .with_endpoint(endpoint)
        .with_extra("organization", "testorg");
    let scope = Scope::new("johndoe/test-repo")
        .with_name("test-repo")
        .with_extra("url", "https://github.com/johndoe/test-repo")
        .with_extra("org_id", "testorg")
        .with_extra("project_id", "test-project")
        .with_extra("repository_type", "GitHub");
    Context::new(Storage::open_in_memory().unwrap(), connection, scope)
        .with_scope_config(scope_config(None))
}

fn raw_build() -> JsonValue {
    json!({
        "properties": {},
        "tags": [],
        "triggerInfo": {
            "ci.sourceBranch": "refs/heads/main",
            "ci.sourceSha": "40e3d9cb9f208f431cf1fb0e33963f5a1405491b",
            "ci.message": "Add azure-pipelines.yml jobs to Azure Pipelines",
            "ci.triggerRepository": "eaf116f6-821f-42d7-920e-a867e564302e"
        },
        "_links": {
            "self": {"href": "https://dev.azure.com/linweihoumerico-lake/e8af9e7b-d4bf-4afd-9d0a-c9f8dfac1d59/_apis/build/Builds/15"},
            "web": {"href": WEB_URL}
        },
        "id": 12,
        "buildNumber": "azure-job",
        "status": "completed",
        "result": "succeeded",
        "queueTime": "2023-02-25T06:22:21.2237625Z",
        "start_time": "2023-02-25T06:22:32.8097789Z",
        "finish_time": "2023-02-25T06:23:04.0061884Z",
        "definition": {"id": 5, "name": "deploy_to_prod", "type": "build"},
        "sourceBranch": "refs/heads/main",
        "sourceVersion": "40c59264e73fc5e1a6cab192f1622d26b7bd5c2a",
        "repository": {"id": "johndoe/test-repo", "type": "GitHub"},
        "retainedByRelease": false,
        "triggeredByBuild": null
    })
}

fn raw_job(id: &str, name: &str) -> JsonValue {
    json!({
        "previousAttempts": [],
        "id": id,
        "parentId": "9ecf18fe-987d-5811-7c63-300aecae35da",
        "type": "Job",
        "name": name,
        "build_id": "azuredevops:Build:1:12",
        "start_time": "2023-02-25T06:22:36.8066667Z",
        "finish_time": "2023-02-25T06:22:43.2333333Z",
        "currentOperation": null,
        "state": "completed",
        "result": "succeeded",
        "resultCode": null,
        "changeId": 18,
        "lastModified": "0001-01-01T00:00:00",
        "workerName": "Hosted Agent",
        "order": 1,
        "errorCount": 0,
        "attempt": 1,
        "identifier": "job_2.__default"
    })
}

// ============================================================================
// Mappings
// ============================================================================

#[test_case("completed" => CicdStatus::Done)]
#[test_case("cancelling" => CicdStatus::Done)]
#[test_case("inProgress" => CicdStatus::InProgress)]
#[test_case("notStarted" => CicdStatus::InProgress)]
#[test_case("postponed" => CicdStatus::InProgress)]
#[test_case("none" => CicdStatus::Other)]
fn test_build_status(status: &str) -> CicdStatus {
    build_status(status)
}

#[test_case("succeeded" => Some(CicdResult::Success))]
#[test_case("partiallySucceeded" => Some(CicdResult::Success))]
#[test_case("failed" => Some(CicdResult::Failure))]
#[test_case("canceled" => Some(CicdResult::Abort))]
#[test_case("none" => None)]
fn test_build_result(result: &str) -> Option<CicdResult> {
    build_result(result)
}

#[test_case("completed" => CicdStatus::Done)]
#[test_case("inProgress" => CicdStatus::InProgress)]
#[test_case("pending" => CicdStatus::InProgress)]
#[test_case("" => CicdStatus::Other)]
fn test_job_status(state: &str) -> CicdStatus {
    job_status(state)
}

#[test_case("succeeded" => Some(CicdResult::Success))]
#[test_case("succeededWithIssues" => Some(CicdResult::Success))]
#[test_case("failed" => Some(CicdResult::Failure))]
#[test_case("canceled" => Some(CicdResult::Abort))]
#[test_case("abandoned" => Some(CicdResult::Abort))]
#[test_case("skipped" => None)]
fn test_job_result(result: &str) -> Option<CicdResult> {
    job_result(result)
}

const ENV_PATTERN: &str = r"(?:deploy|predeploy)[_-](.+?)(?:[_-](?:helm|terraform))?$";

#[test_case("deploy_to_prod", None => Some(CicdEnvironment::Production) ; "name matches production")]
#[test_case("build", None => None ; "name does not match")]
#[test_case("deploy_xxxx-dev_helm", Some(ENV_PATTERN) => None ; "environment is dev")]
#[test_case("deploy_xxxx-prod_helm", Some(ENV_PATTERN) => Some(CicdEnvironment::Production) ; "environment is prod")]
#[test_case("release-prod", Some(ENV_PATTERN) => Some(CicdEnvironment::Production) ; "pattern misses, whole name used")]
fn test_classifier_environment(name: &str, env: Option<&str>) -> Option<CicdEnvironment> {
    let config = AzureScopeConfig {
        deployment_pattern: Some("deploy".to_string()),
        production_pattern: Some("prod".to_string()),
        environment_pattern: env.map(str::to_string),
    };
    config.compile().unwrap().environment(name)
}

#[test]
fn test_classifier_kind() {
    let classifier = AzureScopeConfig {
        deployment_pattern: Some("deploy".to_string()),
        ..Default::default()
    }
    .compile()
    .unwrap();
    assert_eq!(classifier.kind("deploy_to_prod"), CicdType::Deployment);
    assert_eq!(classifier.kind("unit-tests"), CicdType::Build);

    let empty = AzureScopeConfig::default().compile().unwrap();
    assert_eq!(empty.kind("deploy_to_prod"), CicdType::Build);
    assert_eq!(empty.environment("deploy_to_prod"), None);
}

#[test]
fn test_invalid_pattern_is_rejected() {
    let config = AzureScopeConfig {
        deployment_pattern: Some("(unclosed".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        config.compile(),
        Err(Error::InvalidConfigValue { .. })
    ));
}

// ============================================================================
// Extract & convert
// ============================================================================

#[tokio::test]
async fn test_builds_extract_and_convert() {
    let ctx = context("http://localhost");
    let build = Builds.extract(raw_build()).unwrap().unwrap();
    assert_eq!(build.id, 12);
    assert_eq!(build.name, "deploy_to_prod");

    let records = Builds.convert(&build, &ctx).await.unwrap();
    assert_eq!(records.len(), 2);

    let pipeline: CicdPipeline = serde_json::from_value(records[0].data.clone()).unwrap();
    let duration = pipeline.duration_sec.unwrap();
    assert!((duration - 31.196_409_940_719_604).abs() < 1e-3);
    pretty_assertions::assert_eq!(
        pipeline,
        CicdPipeline {
            name: "deploy_to_prod".to_string(),
            status: CicdStatus::Done,
            result: Some(CicdResult::Success),
            original_status: "Completed".to_string(),
            original_result: Some("Succeeded".to_string()),
            kind: Some(CicdType::Deployment),
            environment: Some(CicdEnvironment::Production),
            created_date: at("2023-02-25T06:22:21.2237625Z"),
            queued_date: at("2023-02-25T06:22:21.2237625Z"),
            started_date: at("2023-02-25T06:22:32.8097789Z"),
            finished_date: at("2023-02-25T06:23:04.0061884Z"),
            duration_sec: Some(duration),
            cicd_scope_id: "azuredevops:GitRepository:1:johndoe/test-repo".to_string(),
            display_title: Some("Add azure-pipelines.yml jobs to Azure Pipelines".to_string()),
            url: Some(WEB_URL.to_string()),
        }
    );
    assert_eq!(records[0].key, None);

    let commit: CicdPipelineCommit = serde_json::from_value(records[1].data.clone()).unwrap();
    pretty_assertions::assert_eq!(
        commit,
        CicdPipelineCommit {
            pipeline_id: "azuredevops:Build:1:12".to_string(),
            commit_sha: "40c59264e73fc5e1a6cab192f1622d26b7bd5c2a".to_string(),
            branch: "refs/heads/main".to_string(),
            repo_id: "azuredevops:GitRepository:1:johndoe/test-repo".to_string(),
            repo_url: Some("https://github.com/johndoe/test-repo".to_string()),
            display_title: Some("Add azure-pipelines.yml jobs to Azure Pipelines".to_string()),
            url: Some(WEB_URL.to_string()),
        }
    );
}

#[test]
fn test_deleted_build_is_dropped() {
    let mut raw = raw_build();
    raw["deleted"] = json!(true);
    assert_eq!(Builds.extract(raw).unwrap(), None);
}

#[test]
fn test_build_extract_rejects_malformed_payload() {
    assert!(Builds.extract(json!({"id": "not-a-number"})).is_err());
}

#[tokio::test]
async fn test_build_without_commit_has_no_pipeline_commit() {
    let ctx = context("http://localhost");
    let mut raw = raw_build();
    raw.as_object_mut().unwrap().remove("sourceVersion");
    raw["status"] = json!("inProgress");
    raw["result"] = JsonValue::Null;
    raw.as_object_mut().unwrap().remove("finish_time");

    let build = Builds.extract(raw).unwrap().unwrap();
    let records = Builds.convert(&build, &ctx).await.unwrap();
    assert_eq!(records.len(), 1);

    let pipeline: CicdPipeline = serde_json::from_value(records[0].data.clone()).unwrap();
    assert_eq!(pipeline.status, CicdStatus::InProgress);
    assert_eq!(pipeline.result, None);
    assert_eq!(pipeline.original_result, None);
    assert_eq!(pipeline.duration_sec, None);
}

#[tokio::test]
async fn test_jobs_extract_and_convert() {
    let ctx = context("http://localhost");
    let job = Jobs
        .extract(raw_job("cfa20e98-6997-523c-4233-f0a7302c929f", "deploy production"))
        .unwrap()
        .unwrap();
    assert_eq!(
        crate::model::ToolModel::primary_key(&job),
        vec![
            "azuredevops:Build:1:12".to_string(),
            "cfa20e98-6997-523c-4233-f0a7302c929f".to_string()
        ]
    );

    let records = Jobs.convert(&job, &ctx).await.unwrap();
    let task: CicdTask = serde_json::from_value(records[0].data.clone()).unwrap();
    let duration = task.duration_sec.unwrap();
    assert!((duration - 6.426_667).abs() < 1e-3);
    pretty_assertions::assert_eq!(
        task,
        CicdTask {
            name: "deploy production".to_string(),
            pipeline_id: "azuredevops:Build:1:12".to_string(),
            status: CicdStatus::Done,
            result: Some(CicdResult::Success),
            original_status: "Completed".to_string(),
            original_result: Some("Succeeded".to_string()),
            kind: Some(CicdType::Deployment),
            environment: Some(CicdEnvironment::Production),
            created_date: at("2023-02-25T06:22:36.8066667Z"),
            started_date: at("2023-02-25T06:22:36.8066667Z"),
            finished_date: at("2023-02-25T06:22:43.2333333Z"),
            duration_sec: Some(duration),
            cicd_scope_id: "azuredevops:GitRepository:1:johndoe/test-repo".to_string(),
        }
    );
}

#[tokio::test]
async fn test_job_environment_pattern() {
    let ctx = context("http://localhost")
        .with_scope_config(scope_config(Some(ENV_PATTERN)));

    let dev = Jobs.extract(raw_job("a", "deploy_xxxx-dev_helm")).unwrap().unwrap();
    let task: CicdTask =
        serde_json::from_value(Jobs.convert(&dev, &ctx).await.unwrap()[0].data.clone()).unwrap();
    assert_eq!(task.kind, Some(CicdType::Deployment));
    assert_eq!(task.environment, None);

    let prod = Jobs.extract(raw_job("b", "deploy_xxxx-prod_helm")).unwrap().unwrap();
    let task: CicdTask =
        serde_json::from_value(Jobs.convert(&prod, &ctx).await.unwrap()[0].data.clone()).unwrap();
    assert_eq!(task.environment, Some(CicdEnvironment::Production));
}

// ============================================================================
// Collect
// ============================================================================

#[tokio::test]
async fn test_builds_collect_follows_continuation_token() {
    let server = MockServer::start().await;
    let ctx = context(&server.uri());

    Mock::given(method("GET"))
        .and(path(BUILDS_PATH))
        .and(query_param("api-version", API_VERSION))
        .and(query_param("repositoryId", "johndoe/test-repo"))
        .and(query_param("repositoryType", "GitHub"))
        .and(query_param("queryOrder", "finishTimeAscending"))
        .and(query_param_is_missing("continuationToken"))
        .and(header("authorization", "Basic OnRva2Vu"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ms-continuationtoken", "page-2")
                .set_body_json(json!({
                    "count": 2,
                    "value": [
                        {"id": 1, "status": "completed", "finishTime": "2023-02-25T06:00:00Z"},
                        {"id": 2, "status": "completed", "finishTime": "2023-02-25T07:00:00Z"}
                    ]
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(BUILDS_PATH))
        .and(query_param("continuationToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "value": [{"id": 3, "status": "inProgress"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items: Vec<_> = Builds
        .collect(State::new(), &ctx)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items.len(), 3);
    let ids: Vec<u64> = items
        .iter()
        .map(|(item, _)| item.data["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(items[0].0.url.as_deref().unwrap().ends_with(BUILDS_PATH));

    assert_eq!(items[0].1.get_str(MIN_TIME), Some("2023-02-25T06:00:00Z"));
    assert_eq!(items[1].1.get_str(MIN_TIME), Some("2023-02-25T07:00:00Z"));
    // unfinished builds keep the previous watermark
    assert_eq!(items[2].1.get_str(MIN_TIME), Some("2023-02-25T07:00:00Z"));
}

#[tokio::test]
async fn test_builds_collect_resumes_from_min_time() {
    let server = MockServer::start().await;
    let ctx = context(&server.uri());

    Mock::given(method("GET"))
        .and(path(BUILDS_PATH))
        .and(query_param("minTime", "2023-02-25T07:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let state = State::new().with(MIN_TIME, "2023-02-25T07:00:00Z");
    let items: Vec<_> = Builds.collect(state, &ctx).try_collect().await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_builds_collect_requires_project() {
    let mut ctx = context("http://localhost");
    ctx.scope.extra.remove("project_id");

    let result: Result<Vec<_>> = Builds.collect(State::new(), &ctx).try_collect().await;
    assert!(matches!(result, Err(Error::MissingConfigField { .. })));
}

#[tokio::test]
async fn test_jobs_collect_keeps_jobs_and_stages() {
    let server = MockServer::start().await;
    let ctx = context(&server.uri());

    Mock::given(method("GET"))
        .and(path(format!("{BUILDS_PATH}/12/timeline")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                {"id": "stage-id-123", "type": "Stage", "name": "deploy_prod_stage"},
                {"id": "cfa20e98-6997-523c-4233-f0a7302c929f", "type": "Job", "name": "deploy production"},
                {"id": "task-1", "type": "Task", "name": "Checkout"},
                {"id": "phase-1", "type": "Phase", "name": "Phase 1"}
            ]
        })))
        .mount(&server)
        .await;

    let parent: Build = serde_json::from_value::<ApiBuild>(raw_build()).unwrap().into();
    let items: Vec<_> = Jobs
        .collect(State::new(), &ctx, parent)
        .try_collect()
        .await
        .unwrap();

    let names: Vec<&str> = items
        .iter()
        .map(|(item, _)| item.data["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["deploy_prod_stage", "deploy production"]);
    for (item, _) in &items {
        assert_eq!(item.data["build_id"], "azuredevops:Build:1:12");
        assert!(item.url.as_deref().unwrap().ends_with("/12/timeline"));
    }
}

#[tokio::test]
async fn test_jobs_collect_missing_timeline_is_empty() {
    let server = MockServer::start().await;
    let ctx = context(&server.uri());

    Mock::given(method("GET"))
        .and(path(format!("{BUILDS_PATH}/12/timeline")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let parent: Build = serde_json::from_value::<ApiBuild>(raw_build()).unwrap().into();
    let items: Vec<_> = Jobs
        .collect(State::new(), &ctx, parent)
        .try_collect()
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_jobs_collect_propagates_server_errors() {
    let server = MockServer::start().await;
    let ctx = context(&server.uri());

    Mock::given(method("GET"))
        .and(path(format!("{BUILDS_PATH}/12/timeline")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let parent: Build = serde_json::from_value::<ApiBuild>(raw_build()).unwrap().into();
    let result: Result<Vec<_>> = Jobs.collect(State::new(), &ctx, parent).try_collect().await;
    assert!(result.unwrap_err().is_status(500));
}

// ============================================================================
// Connector
// ============================================================================

#[test]
fn test_plugin_subtasks() {
    let plugin = AzureDevOps.plugin().unwrap();
    let names: Vec<String> = plugin.subtasks().into_iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![
            "collectAzuredevopsBuilds",
            "extractAzuredevopsBuilds",
            "convertAzuredevopsBuilds",
            "collectAzuredevopsJobs",
            "extractAzuredevopsJobs",
            "convertAzuredevopsJobs",
        ]
    );
}

#[tokio::test]
async fn test_check_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/testorg/_apis/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 1, "value": []})))
        .mount(&server)
        .await;

    let ctx = context(&server.uri());
    let result = AzureDevOps.check(&ctx.connection, &ctx.http).await.unwrap();
    assert_eq!(result, CheckResult::success());
}

#[test_case(401, "Invalid token")]
#[test_case(203, "Invalid token")]
#[test_case(404, "Organization 'testorg' not found")]
#[tokio::test]
async fn test_check_failure(status: u16, message: &str) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/testorg/_apis/projects"))
        .respond_with(ResponseTemplate::new(status).set_body_string("<html>sign in</html>"))
        .mount(&server)
        .await;

    let ctx = context(&server.uri());
    let result = AzureDevOps.check(&ctx.connection, &ctx.http).await.unwrap();
    assert_eq!(result, CheckResult::failure(message));
}

#[tokio::test]
async fn test_check_requires_organization() {
    let connection = Connection::new(1).with_token("token");
    let result = AzureDevOps.check(&connection, &HttpConfig::default()).await;
    assert!(matches!(result, Err(Error::MissingConfigField { .. })));
}
