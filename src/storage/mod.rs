//! Layered storage via DuckDB
//!
//! One database holds every layer:
//! - `_raw_<plugin>_<stream>` tables with the collected payloads
//! - tool tables keyed by `(connection_id, natural_key)`
//! - domain tables keyed by a synthetic `id`
//! - the subtask run table (see [`crate::state`])
//!
//! Writes are explicit upserts; readers page by key so large partitions are
//! never loaded at once.

mod engine;

pub use engine::{validate_identifier, Storage};
pub(crate) use engine::{now_string, parse_timestamp};
