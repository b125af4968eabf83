//! Common types used throughout devlake-etl
//!
//! Shared type aliases and the small enums that several modules agree on.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Subtask Phases
// ============================================================================

/// The three phases every stream goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Fetch raw payloads from the remote API
    Collect,
    /// Parse raw payloads into tool records
    Extract,
    /// Map tool records into domain records
    Convert,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 3] = [Phase::Collect, Phase::Extract, Phase::Convert];

    /// Verb used as the subtask name prefix
    pub fn verb(self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Extract => "extract",
            Self::Convert => "convert",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

// ============================================================================
// Domain Types
// ============================================================================

/// Domain areas a stream contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainType {
    Code,
    Ticket,
    CodeReview,
    Cross,
    Cicd,
    CodeQuality,
}

// ============================================================================
// Helpers
// ============================================================================

/// Capitalize the first character and lowercase the rest.
///
/// Subtask names are built as `<verb><Plugin><Stream>`, e.g.
/// `collectAzuredevopsBuilds`.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
