//! State types for tracking subtask progress
//!
//! A [`State`] is an opaque JSON object owned by the stream (for example the
//! `minTime` of the last collected build). The runner persists it on every
//! checkpoint in the subtask run table.

use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checkpoint state of one subtask
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(JsonObject);

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Get a string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str()
    }

    /// Set a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`State::set`]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }

    /// Compact JSON form as stored in the run table
    pub fn to_json(&self) -> String {
        JsonValue::Object(self.0.clone()).to_string()
    }
}

impl From<JsonObject> for State {
    fn from(map: JsonObject) -> Self {
        Self(map)
    }
}

/// One execution of a subtask for a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskRun {
    pub id: i64,
    pub subtask_name: String,
    pub connection_id: i64,
    pub started: DateTime<Utc>,
    /// Set only when the run finished successfully
    pub completed: Option<DateTime<Utc>>,
    /// Time of the last mid-run checkpoint
    pub checkpointed_at: Option<DateTime<Utc>>,
    pub state: State,
}

impl SubtaskRun {
    pub fn is_completed(&self) -> bool {
        self.completed.is_some()
    }
}
