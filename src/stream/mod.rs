//! Streams: the per-entity units a plugin is made of
//!
//! A stream knows how to collect raw payloads from the remote API, extract
//! them into its tool model and convert tool records into domain records.
//! Plugins implement the typed [`Stream`] / [`Substream`] traits; the runner
//! only sees the erased [`AnyStream`].

mod adapter;
mod types;

pub use adapter::{AnyStream, StreamAdapter, SubstreamAdapter};
pub use types::{CollectStream, RawItem, Stream, Substream};

#[cfg(test)]
mod tests;
