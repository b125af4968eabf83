//! Execution context handed to every subtask
//!
//! A [`Context`] bundles the storage handle with the connection, scope and
//! scope config of one run. The serializable half of it, [`ContextSpec`], is
//! what the CLI reads from `--context`.

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::storage::Storage;
use crate::types::{JsonObject, JsonValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// Connection & Scope
// ============================================================================

/// Credentials and endpoint of a data source
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: i64,

    #[serde(default)]
    pub name: String,

    /// Base URL of the remote API
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    /// HTTP(S) proxy for every request of this connection
    #[serde(default)]
    pub proxy: Option<String>,

    /// Plugin-specific fields
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl Connection {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            endpoint: None,
            token: None,
            proxy: None,
            extra: JsonObject::new(),
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// String value of a plugin-specific field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key)?.as_str()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

/// The unit of data inside a connection (a repository, a project...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Plugin-specific fields
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl Scope {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            extra: JsonObject::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key)?.as_str()
    }
}

/// Per-run options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Resume from the previous state instead of wiping the partition
    #[serde(default)]
    pub incremental: bool,
}

// ============================================================================
// Context
// ============================================================================

/// Serializable description of a run, without the storage handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSpec {
    pub connection: Connection,
    pub scope: Scope,

    #[serde(default)]
    pub scope_config: JsonObject,

    #[serde(default, flatten)]
    pub options: ExecutionOptions,
}

impl ContextSpec {
    /// Parse from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid context: {e}")))
    }

    /// Attach storage and HTTP settings
    pub fn into_context(self, storage: Storage, http: HttpConfig) -> Context {
        Context {
            storage,
            connection: self.connection,
            scope: self.scope,
            scope_config: self.scope_config,
            options: self.options,
            http,
        }
    }
}

/// Everything a subtask needs for one run
#[derive(Debug, Clone)]
pub struct Context {
    pub storage: Storage,
    pub connection: Connection,
    pub scope: Scope,
    pub scope_config: JsonObject,
    pub options: ExecutionOptions,
    pub http: HttpConfig,
}

impl Context {
    pub fn new(storage: Storage, connection: Connection, scope: Scope) -> Self {
        Self {
            storage,
            connection,
            scope,
            scope_config: JsonObject::new(),
            options: ExecutionOptions::default(),
            http: HttpConfig::default(),
        }
    }

    #[must_use]
    pub fn with_scope_config(mut self, scope_config: JsonObject) -> Self {
        self.scope_config = scope_config;
        self
    }

    #[must_use]
    pub fn incremental(mut self, incremental: bool) -> Self {
        self.options.incremental = incremental;
        self
    }

    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// The partition this run reads and writes
    pub fn partition(&self) -> Partition {
        Partition::new(self.connection.id, self.scope.id.clone())
    }

    /// Canonical params of [`Context::partition`]
    pub fn params(&self) -> String {
        self.partition().params()
    }

    /// Decode the scope config into a plugin's typed form
    pub fn scope_config<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(JsonValue::Object(self.scope_config.clone()))
            .map_err(|e| Error::invalid_value("scope_config", e.to_string()))
    }
}
