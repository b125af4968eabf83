//! Tool and domain models
//!
//! Plugins describe their tool schema with [`ToolModel`] and the shared
//! schema with [`DomainModel`]. Both are serde types; storage keeps their
//! JSON form next to typed key and lineage columns.

mod types;

pub use types::{
    domain_id, natural_key, DomainModel, DomainRecord, DomainRow, RawOrigin, RawRecord,
    ToolModel, ToolRow,
};

#[cfg(test)]
mod tests;
