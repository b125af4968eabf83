//! Built-in connectors compiled into the binary
//!
//! Each connector bundles a [`Plugin`] with a connection check, so the CLI
//! can run `--plugin azuredevops` without any extra wiring.

pub mod azuredevops;

use crate::config::HttpConfig;
use crate::context::Connection;
use crate::error::{Error, Result};
use crate::plugin::Plugin;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

// ============================================================================
// Check Result
// ============================================================================

/// Result of a connection check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the check succeeded
    pub success: bool,

    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a successful check result
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Create a failed check result
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Connector Trait
// ============================================================================

/// A data source shipped with the crate
#[async_trait]
pub trait Connector: Send + Sync {
    /// Plugin name, as used in subtask names and raw table names
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Build the connector's plugin
    fn plugin(&self) -> Result<Plugin>;

    /// Verify that a connection can reach the remote API.
    ///
    /// Authentication and reachability problems are reported as a failed
    /// [`CheckResult`]; `Err` is reserved for local misconfiguration.
    async fn check(&self, connection: &Connection, http: &HttpConfig) -> Result<CheckResult>;
}

// ============================================================================
// Registry
// ============================================================================

/// Built-in connectors by name
pub static BUILTIN_CONNECTORS: LazyLock<HashMap<&'static str, Arc<dyn Connector>>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, Arc<dyn Connector>> = HashMap::new();

        // CI/CD
        let azure: Arc<dyn Connector> = Arc::new(azuredevops::AzureDevOps);
        m.insert(azure.name(), Arc::clone(&azure));
        m.insert("azure-devops", azure);

        m
    });

/// Get a built-in connector by name or alias
pub fn get_builtin(name: &str) -> Result<Arc<dyn Connector>> {
    BUILTIN_CONNECTORS
        .get(name)
        .cloned()
        .ok_or_else(|| Error::UnknownPlugin {
            name: name.to_string(),
        })
}

/// Check if a name is a built-in connector
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_CONNECTORS.contains_key(name)
}

/// Primary names of the built-in connectors, sorted
pub fn list_builtin() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTIN_CONNECTORS.values().map(|c| c.name()).collect();
    names.sort_unstable();
    names.dedup();
    names
}
