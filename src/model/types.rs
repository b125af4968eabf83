//! Record types for the three storage layers
//!
//! - raw: the JSON payload exactly as collected, tagged with partition params
//! - tool: the plugin's own schema, keyed by `(connection_id, natural key)`
//! - domain: the shared cross-tool schema, keyed by a synthetic id

use crate::error::{Error, Result};
use crate::types::JsonValue;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// Model traits
// ============================================================================

/// A record in a plugin's tool schema
pub trait ToolModel: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Tool table name, e.g. `_tool_azuredevops_builds`
    const TABLE: &'static str;

    /// Type name used in domain ids, e.g. `Build`
    const TYPE_NAME: &'static str;

    /// Natural primary key within a connection
    fn primary_key(&self) -> Vec<String>;
}

/// A record in the shared domain schema
pub trait DomainModel: Serialize + Send + Sync {
    /// Domain table name, e.g. `cicd_pipelines`
    const TABLE: &'static str;

    /// Explicit key for relationship records.
    ///
    /// `None` means the id is derived from the originating tool record.
    fn key(&self) -> Option<Vec<String>> {
        None
    }
}

/// Deterministic domain id: `plugin:TypeName:connectionId:key1:key2...`
///
/// Key parts are joined verbatim, so a part may itself be a domain id (a job
/// keyed by its pipeline's id). Parts containing `:` are not escaped: the
/// keys `["a:b"]` and `["a", "b"]` give the same id. Ids stay unique while a
/// model has a fixed key arity and at most one part that can contain `:`.
pub fn domain_id(plugin: &str, type_name: &str, connection_id: i64, keys: &[String]) -> String {
    let mut parts = Vec::with_capacity(keys.len() + 3);
    parts.push(plugin.to_string());
    parts.push(type_name.to_string());
    parts.push(connection_id.to_string());
    parts.extend(keys.iter().cloned());
    parts.join(":")
}

/// Natural key as stored in tool tables (a JSON array of strings)
pub fn natural_key(keys: &[String]) -> String {
    serde_json::to_string(keys).unwrap_or_default()
}

// ============================================================================
// Lineage
// ============================================================================

/// Where a tool or domain row came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOrigin {
    /// Partition params of the raw row
    pub raw_data_params: Option<String>,
    /// Raw table name
    pub raw_data_table: Option<String>,
    /// Raw row id
    pub raw_data_id: Option<i64>,
}

impl RawOrigin {
    pub fn from_raw(table: &str, raw: &RawRecord) -> Self {
        Self {
            raw_data_params: Some(raw.params.clone()),
            raw_data_table: Some(table.to_string()),
            raw_data_id: Some(raw.id),
        }
    }
}

// ============================================================================
// Stored rows
// ============================================================================

/// A row of a raw table
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: i64,
    pub params: String,
    pub data: Vec<u8>,
    pub url: Option<String>,
    pub input: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RawRecord {
    /// Decode the stored payload
    pub fn json(&self) -> Result<JsonValue> {
        serde_json::from_slice(&self.data).map_err(|e| {
            Error::decode(format!("raw row {} holds invalid JSON: {e}", self.id))
        })
    }
}

/// A row of a tool table
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRow {
    pub connection_id: i64,
    pub natural_key: Vec<String>,
    pub data: JsonValue,
    pub origin: RawOrigin,
}

impl ToolRow {
    /// Wrap a tool model for storage
    pub fn from_model<T: ToolModel>(
        model: &T,
        connection_id: i64,
        origin: RawOrigin,
    ) -> Result<Self> {
        Ok(Self {
            connection_id,
            natural_key: model.primary_key(),
            data: serde_json::to_value(model)?,
            origin,
        })
    }

    /// Decode into the stream's tool model
    pub fn decode<T: ToolModel>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            Error::decode(format!(
                "{} row {:?} does not match its model: {e}",
                T::TABLE,
                self.natural_key
            ))
        })
    }
}

/// A domain record produced by convert, before its id is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRecord {
    pub table: &'static str,
    pub data: JsonValue,
    pub key: Option<Vec<String>>,
}

impl DomainRecord {
    pub fn new<M: DomainModel>(model: &M) -> Result<Self> {
        Ok(Self {
            table: M::TABLE,
            data: serde_json::to_value(model)?,
            key: model.key(),
        })
    }
}

/// A row of a domain table
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRow {
    pub id: String,
    pub data: JsonValue,
    pub origin: RawOrigin,
}

impl DomainRow {
    /// Assign the id and lineage to a converted record.
    ///
    /// The id is also written into the payload's `id` field.
    pub fn from_record(record: DomainRecord, id: String, origin: RawOrigin) -> Self {
        let mut data = record.data;
        if let JsonValue::Object(map) = &mut data {
            map.insert("id".to_string(), JsonValue::String(id.clone()));
        }
        Self { id, data, origin }
    }

    /// Decode the payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
