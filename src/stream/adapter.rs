//! Erased stream interface used by the runner and the plugin registry

use super::types::{CollectStream, Stream, Substream};
use crate::context::{Context, Scope};
use crate::error::{Error, Result};
use crate::model::{domain_id, DomainRecord, DomainRow, RawOrigin, ToolModel, ToolRow};
use crate::state::State;
use crate::types::{DomainType, JsonValue};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

/// Object-safe view of a [`Stream`] or [`Substream`] bound to its plugin
#[async_trait]
pub trait AnyStream: Send + Sync {
    /// Owning plugin name
    fn plugin(&self) -> &str;

    fn name(&self) -> &str;

    /// Raw table name: `_raw_<plugin>_<stream>`
    fn raw_table(&self) -> String {
        format!("_raw_{}_{}", self.plugin(), self.name())
    }

    fn tool_table(&self) -> &'static str;

    /// Type name used in domain ids
    fn tool_type_name(&self) -> &'static str;

    /// Parent stream name, for substreams
    fn parent_stream(&self) -> Option<&str> {
        None
    }

    /// Parent tool table, for substreams
    fn parent_table(&self) -> Option<&'static str> {
        None
    }

    fn domain_types(&self) -> Vec<DomainType>;

    fn should_run_on(&self, scope: &Scope) -> bool;

    /// Collect a top-level stream
    fn collect<'a>(&'a self, state: State, ctx: &'a Context) -> CollectStream<'a>;

    /// Collect a substream for one stored parent row
    fn collect_for_parent<'a>(
        &'a self,
        state: State,
        ctx: &'a Context,
        parent: ToolRow,
    ) -> CollectStream<'a>;

    /// Extract a raw payload into a tool row with lineage attached
    fn extract(
        &self,
        raw: JsonValue,
        connection_id: i64,
        origin: RawOrigin,
    ) -> Result<Option<ToolRow>>;

    /// Convert a tool row into `(domain table, domain row)` pairs
    async fn convert(&self, row: &ToolRow, ctx: &Context) -> Result<Vec<(&'static str, DomainRow)>>;
}

fn failed<'a>(error: Error) -> CollectStream<'a> {
    stream::once(async move { Err(error) }).boxed()
}

fn extract_row<T: ToolModel>(
    stream: &str,
    tool: Result<Option<T>>,
    connection_id: i64,
    origin: RawOrigin,
) -> Result<Option<ToolRow>> {
    match tool {
        Ok(Some(tool)) => ToolRow::from_model(&tool, connection_id, origin).map(Some),
        Ok(None) => Ok(None),
        Err(e) => Err(Error::extract(stream, e.to_string())),
    }
}

fn decode_row<T: ToolModel>(stream: &str, row: &ToolRow) -> Result<T> {
    row.decode().map_err(|e| Error::convert(stream, e.to_string()))
}

/// Assign ids and lineage to converted records.
///
/// Records without an explicit key take the id of the originating tool row.
fn domain_rows(
    plugin: &str,
    type_name: &str,
    row: &ToolRow,
    records: Vec<DomainRecord>,
) -> Vec<(&'static str, DomainRow)> {
    let tool_id = domain_id(plugin, type_name, row.connection_id, &row.natural_key);
    records
        .into_iter()
        .map(|record| {
            let table = record.table;
            let id = record
                .key
                .as_ref()
                .map_or_else(|| tool_id.clone(), |key| key.join(":"));
            (table, DomainRow::from_record(record, id, row.origin.clone()))
        })
        .collect()
}

// ============================================================================
// Top-level streams
// ============================================================================

/// Binds a [`Stream`] to its plugin
pub struct StreamAdapter<S> {
    plugin: String,
    inner: S,
}

impl<S: Stream> StreamAdapter<S> {
    pub fn new(plugin: impl Into<String>, inner: S) -> Self {
        Self {
            plugin: plugin.into(),
            inner,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Stream> AnyStream for StreamAdapter<S> {
    fn plugin(&self) -> &str {
        &self.plugin
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn tool_table(&self) -> &'static str {
        S::Tool::TABLE
    }

    fn tool_type_name(&self) -> &'static str {
        S::Tool::TYPE_NAME
    }

    fn domain_types(&self) -> Vec<DomainType> {
        self.inner.domain_types()
    }

    fn should_run_on(&self, scope: &Scope) -> bool {
        self.inner.should_run_on(scope)
    }

    fn collect<'a>(&'a self, state: State, ctx: &'a Context) -> CollectStream<'a> {
        self.inner.collect(state, ctx)
    }

    fn collect_for_parent<'a>(
        &'a self,
        _state: State,
        _ctx: &'a Context,
        _parent: ToolRow,
    ) -> CollectStream<'a> {
        failed(Error::other(format!(
            "stream '{}' has no parent stream",
            self.name()
        )))
    }

    fn extract(
        &self,
        raw: JsonValue,
        connection_id: i64,
        origin: RawOrigin,
    ) -> Result<Option<ToolRow>> {
        extract_row(self.name(), self.inner.extract(raw), connection_id, origin)
    }

    async fn convert(&self, row: &ToolRow, ctx: &Context) -> Result<Vec<(&'static str, DomainRow)>> {
        let tool: S::Tool = decode_row(self.name(), row)?;
        let records = self.inner.convert(&tool, ctx).await?;
        Ok(domain_rows(&self.plugin, S::Tool::TYPE_NAME, row, records))
    }
}

// ============================================================================
// Substreams
// ============================================================================

/// Binds a [`Substream`] to its plugin
pub struct SubstreamAdapter<S> {
    plugin: String,
    inner: S,
}

impl<S: Substream> SubstreamAdapter<S> {
    pub fn new(plugin: impl Into<String>, inner: S) -> Self {
        Self {
            plugin: plugin.into(),
            inner,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Substream> AnyStream for SubstreamAdapter<S> {
    fn plugin(&self) -> &str {
        &self.plugin
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn tool_table(&self) -> &'static str {
        S::Tool::TABLE
    }

    fn tool_type_name(&self) -> &'static str {
        S::Tool::TYPE_NAME
    }

    fn parent_stream(&self) -> Option<&str> {
        Some(self.inner.parent_stream())
    }

    fn parent_table(&self) -> Option<&'static str> {
        Some(S::Parent::TABLE)
    }

    fn domain_types(&self) -> Vec<DomainType> {
        self.inner.domain_types()
    }

    fn should_run_on(&self, scope: &Scope) -> bool {
        self.inner.should_run_on(scope)
    }

    fn collect<'a>(&'a self, _state: State, _ctx: &'a Context) -> CollectStream<'a> {
        failed(Error::other(format!(
            "substream '{}' must be collected per parent record",
            self.name()
        )))
    }

    fn collect_for_parent<'a>(
        &'a self,
        state: State,
        ctx: &'a Context,
        parent: ToolRow,
    ) -> CollectStream<'a> {
        let parent_model: S::Parent = match parent.decode() {
            Ok(model) => model,
            Err(e) => return failed(e),
        };
        let input = parent.data;
        self.inner
            .collect(state, ctx, parent_model)
            .map_ok(move |(item, state)| {
                let item = if item.input.is_none() {
                    item.with_input(input.clone())
                } else {
                    item
                };
                (item, state)
            })
            .boxed()
    }

    fn extract(
        &self,
        raw: JsonValue,
        connection_id: i64,
        origin: RawOrigin,
    ) -> Result<Option<ToolRow>> {
        extract_row(self.name(), self.inner.extract(raw), connection_id, origin)
    }

    async fn convert(&self, row: &ToolRow, ctx: &Context) -> Result<Vec<(&'static str, DomainRow)>> {
        let tool: S::Tool = decode_row(self.name(), row)?;
        let records = self.inner.convert(&tool, ctx).await?;
        Ok(domain_rows(&self.plugin, S::Tool::TYPE_NAME, row, records))
    }
}
