//! Azure DevOps connector
//!
//! Scopes are git repositories (Azure Repos or external ones built by Azure
//! Pipelines). Streams:
//! - `builds`: pipeline runs, incremental on finish time
//! - `jobs`: timeline jobs and stages of every collected build

mod api;
mod models;
mod streams;

pub use api::{AzureDevOpsApi, RepoScope, API_VERSION, DEFAULT_ENDPOINT};
pub use models::{
    build_result, build_status, job_result, job_status, ApiBuild, ApiTimelineRecord,
    AzureScopeConfig, Build, Classifier, Job,
};
pub use streams::{Builds, Jobs, MIN_TIME};

use super::{CheckResult, Connector};
use crate::config::HttpConfig;
use crate::context::{Connection, Context};
use crate::error::{Error, Result};
use crate::model::domain_id;
use crate::plugin::Plugin;
use async_trait::async_trait;
use tracing::{info, warn};

pub const PLUGIN: &str = "azuredevops";

/// Domain id of the repository scope, e.g. `azuredevops:GitRepository:1:johndoe/test-repo`
pub fn scope_domain_id(ctx: &Context) -> String {
    domain_id(
        PLUGIN,
        "GitRepository",
        ctx.connection.id,
        &[ctx.scope.id.clone()],
    )
}

/// The Azure DevOps connector
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureDevOps;

#[async_trait]
impl Connector for AzureDevOps {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn description(&self) -> &'static str {
        "Azure DevOps pipelines (builds and jobs)"
    }

    fn plugin(&self) -> Result<Plugin> {
        Plugin::builder(PLUGIN)
            .description(self.description())
            .stream(Builds)
            .substream(Jobs)
            .build()
    }

    /// Lists one project of the connection's organization
    async fn check(&self, connection: &Connection, http: &HttpConfig) -> Result<CheckResult> {
        let organization = connection
            .get_str("organization")
            .ok_or_else(|| Error::missing_field("connection.organization"))?;
        let api = AzureDevOpsApi::new(connection, http)?;

        match api.projects(organization).await {
            // Rejected tokens get a sign-in page instead of a 401
            Ok(response) if response.status == 203 => Ok(CheckResult::failure("Invalid token")),
            Ok(_) => {
                info!(connection_id = connection.id, organization, "Connection check passed");
                Ok(CheckResult::success())
            }
            Err(e) if e.is_http_error() => {
                warn!(connection_id = connection.id, error = %e, "Connection check failed");
                let message = match e.status() {
                    Some(401) => "Invalid token".to_string(),
                    Some(403) => format!("Token has no access to organization '{organization}'"),
                    Some(404) => format!("Organization '{organization}' not found"),
                    _ => e.to_string(),
                };
                Ok(CheckResult::failure(message))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests;
