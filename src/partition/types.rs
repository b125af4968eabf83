//! Partition key and its canonical serialization

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(connection_id, scope_id)` partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    /// Connection the data was collected through
    pub connection_id: i64,
    /// Scope (repository, project, board...) inside the connection
    pub scope_id: String,
}

impl Partition {
    /// Create a new partition
    pub fn new(connection_id: i64, scope_id: impl Into<String>) -> Self {
        Self {
            connection_id,
            scope_id: scope_id.into(),
        }
    }

    /// Canonical `params` string.
    ///
    /// Field order is fixed by the struct and there is no whitespace, so the
    /// same partition always yields byte-identical params.
    pub fn params(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"connection_id\":{},\"scope_id\":{:?}}}",
                self.connection_id, self.scope_id
            )
        })
    }

    /// Parse a `params` string back into a partition
    pub fn from_params(params: &str) -> Result<Self> {
        serde_json::from_str(params)
            .map_err(|e| Error::storage(format!("invalid partition params '{params}': {e}")))
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.connection_id, self.scope_id)
    }
}
