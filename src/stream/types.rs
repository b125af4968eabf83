//! Typed stream traits

use crate::context::{Context, Scope};
use crate::error::Result;
use crate::model::{DomainRecord, ToolModel};
use crate::state::State;
use crate::types::{DomainType, JsonValue};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// One collected payload
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub data: JsonValue,
    /// Request the payload came from
    pub url: Option<String>,
    /// Parent record of a substream item
    pub input: Option<JsonValue>,
}

impl RawItem {
    pub fn new(data: JsonValue) -> Self {
        Self {
            data,
            url: None,
            input: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: JsonValue) -> Self {
        self.input = Some(input);
        self
    }
}

impl From<JsonValue> for RawItem {
    fn from(data: JsonValue) -> Self {
        Self::new(data)
    }
}

/// Lazy sequence of `(item, state after item)` produced by collect
pub type CollectStream<'a> = BoxStream<'a, Result<(RawItem, State)>>;

/// A top-level stream
#[async_trait]
pub trait Stream: Send + Sync + 'static {
    /// The stream's tool model
    type Tool: ToolModel;

    /// Stream name, unique within the plugin
    fn name(&self) -> &str;

    /// Domain areas this stream writes to
    fn domain_types(&self) -> Vec<DomainType> {
        Vec::new()
    }

    /// Start a fresh collection from `state`.
    ///
    /// The returned sequence is lazy; nothing is requested until it is polled.
    fn collect<'a>(&'a self, state: State, ctx: &'a Context) -> CollectStream<'a>;

    /// Parse a raw payload; `None` drops it
    fn extract(&self, raw: JsonValue) -> Result<Option<Self::Tool>>;

    /// Map a tool record to domain records
    async fn convert(&self, tool: &Self::Tool, ctx: &Context) -> Result<Vec<DomainRecord>>;

    /// Whether the stream applies to this scope
    fn should_run_on(&self, _scope: &Scope) -> bool {
        true
    }
}

/// A stream collected once per record of a parent stream
#[async_trait]
pub trait Substream: Send + Sync + 'static {
    type Tool: ToolModel;

    /// Tool model of the parent stream
    type Parent: ToolModel;

    fn name(&self) -> &str;

    /// Name of the parent stream in the same plugin
    fn parent_stream(&self) -> &str;

    fn domain_types(&self) -> Vec<DomainType> {
        Vec::new()
    }

    /// Start a fresh collection for one parent record
    fn collect<'a>(&'a self, state: State, ctx: &'a Context, parent: Self::Parent)
        -> CollectStream<'a>;

    fn extract(&self, raw: JsonValue) -> Result<Option<Self::Tool>>;

    async fn convert(&self, tool: &Self::Tool, ctx: &Context) -> Result<Vec<DomainRecord>>;

    fn should_run_on(&self, _scope: &Scope) -> bool {
        true
    }
}
