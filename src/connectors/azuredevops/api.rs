//! Azure DevOps REST client
//!
//! Personal access tokens go in basic auth with an empty user name, every
//! request carries `api-version`, and list endpoints page with the
//! `x-ms-continuationtoken` header.

use crate::config::HttpConfig;
use crate::context::{Connection, Scope};
use crate::error::{Error, Result};
use crate::http::{ApiClient, BasicAuthHook, QueryParamHook, Response};
use crate::pagination::{PagedResponse, TokenPaginator};
use crate::types::JsonValue;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://dev.azure.com/";
pub const API_VERSION: &str = "7.1";

/// Where a repository scope lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoScope {
    pub organization: String,
    pub project: String,
    pub repository_id: String,
    /// `TfsGit` for Azure Repos, `GitHub` etc. for external ones
    pub repository_type: String,
}

impl RepoScope {
    /// Read the location fields of a scope, falling back to the connection's organization
    pub fn resolve(scope: &Scope, connection: &Connection) -> Result<Self> {
        let organization = scope
            .get_str("org_id")
            .or_else(|| scope.get_str("organization"))
            .or_else(|| connection.get_str("organization"))
            .ok_or_else(|| Error::missing_field("scope.org_id"))?;
        let project = scope
            .get_str("project_id")
            .ok_or_else(|| Error::missing_field("scope.project_id"))?;
        Ok(Self {
            organization: organization.to_string(),
            project: project.to_string(),
            repository_id: scope.id.clone(),
            repository_type: scope
                .get_str("repository_type")
                .unwrap_or("TfsGit")
                .to_string(),
        })
    }
}

/// Client for one connection
#[derive(Debug, Clone)]
pub struct AzureDevOpsApi {
    client: ApiClient,
}

impl AzureDevOpsApi {
    pub fn new(connection: &Connection, http: &HttpConfig) -> Result<Self> {
        let token = connection
            .token
            .as_deref()
            .ok_or_else(|| Error::missing_field("connection.token"))?;
        let endpoint = connection.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);

        let client = ApiClient::builder(endpoint)
            .config(http)
            .proxy(connection.proxy.clone())
            .request_hook(BasicAuthHook::new("", token))
            .request_hook(QueryParamHook::new("api-version", API_VERSION))
            .paginator(TokenPaginator::header(
                "value",
                "x-ms-continuationtoken",
                "continuationToken",
            ))
            .build()?;
        Ok(Self { client })
    }

    /// Builds of a repository, oldest finish time first
    pub async fn builds(&self, repo: &RepoScope, min_time: Option<&str>) -> Result<PagedResponse> {
        let mut request = self
            .client
            .request(&[repo.organization.as_str(), repo.project.as_str(), "_apis/build/builds"])
            .query("repositoryId", &repo.repository_id)
            .query("repositoryType", &repo.repository_type)
            .query("queryOrder", "finishTimeAscending");
        if let Some(min_time) = min_time {
            request = request.query("minTime", min_time);
        }
        debug!(repository = %repo.repository_id, min_time = ?min_time, "Listing builds");
        self.client.get_paged(request).await
    }

    /// Timeline records of a build; a build without a timeline has none
    pub async fn timeline(&self, repo: &RepoScope, build_id: u64) -> Result<(String, Vec<JsonValue>)> {
        let build_id = build_id.to_string();
        let request = self.client.request(&[
            repo.organization.as_str(),
            repo.project.as_str(),
            "_apis/build/builds",
            build_id.as_str(),
            "timeline",
        ]);
        let url = request.url.clone();
        let response = match self.client.send(request).await {
            Ok(response) => response,
            Err(e) if e.is_status(404) => {
                debug!(build_id = %build_id, "Build has no timeline");
                return Ok((url, Vec::new()));
            }
            Err(e) => return Err(e),
        };
        Ok((url, timeline_records(&response)?))
    }

    /// Projects of an organization, used to verify credentials
    pub async fn projects(&self, organization: &str) -> Result<Response> {
        self.client
            .get(&[organization, "_apis/projects"], &[("$top", "1".to_string())])
            .await
    }
}

fn timeline_records(response: &Response) -> Result<Vec<JsonValue>> {
    match response.json_value()? {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Object(mut body) => match body.remove("records") {
            Some(JsonValue::Array(records)) => Ok(records),
            None | Some(JsonValue::Null) => Ok(Vec::new()),
            Some(_) => Err(Error::decode(format!(
                "timeline records from {} are not an array",
                response.request.url
            ))),
        },
        _ => Err(Error::decode(format!(
            "unexpected timeline body from {}",
            response.request.url
        ))),
    }
}
