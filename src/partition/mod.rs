//! Data partitions
//!
//! Every raw, tool and domain row written by a subtask belongs to exactly one
//! partition: a `(connection_id, scope_id)` pair. Its canonical JSON form,
//! the `params` string, is what storage filters on.

mod types;

pub use types::Partition;
