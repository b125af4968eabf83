//! The three subtask kinds sharing the runner loop
//!
//! - [`Collector`]: remote API → raw table
//! - [`Extractor`]: raw table → tool table
//! - [`Convertor`]: tool table → domain tables

use super::types::subtask_name;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::model::{RawOrigin, RawRecord, ToolRow};
use crate::state::State;
use crate::storage::Storage;
use crate::stream::{AnyStream, RawItem};
use crate::types::Phase;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

/// One phase of one stream
#[async_trait]
pub trait Subtask: Send + Sync {
    /// What `fetch` yields and `process` consumes
    type Item: Send;

    fn phase(&self) -> Phase;

    fn stream(&self) -> &dyn AnyStream;

    /// `<verb><Plugin><Stream>`
    fn name(&self) -> String {
        subtask_name(self.phase(), self.stream().plugin(), self.stream().name())
    }

    /// Create the tables this subtask reads and writes
    fn prepare(&self, ctx: &Context) -> Result<()>;

    /// Remove the partition's output before a full run
    fn delete(&self, ctx: &Context) -> Result<()>;

    /// Number of items `fetch` will yield, when cheap to know
    fn total(&self, ctx: &Context) -> Result<Option<u64>>;

    /// Lazy sequence of `(item, state after item)`
    fn fetch<'a>(&'a self, state: State, ctx: &'a Context)
        -> BoxStream<'a, Result<(Self::Item, State)>>;

    /// Handle one item
    async fn process(&self, item: Self::Item, ctx: &Context) -> Result<()>;
}

// ============================================================================
// Keyset readers
// ============================================================================

/// Raw rows of a partition in id order, one page per storage round trip
fn raw_rows<'a>(
    storage: &'a Storage,
    table: String,
    params: String,
    batch_size: usize,
) -> BoxStream<'a, Result<RawRecord>> {
    stream::try_unfold(Some(0_i64), move |cursor| {
        let table = table.clone();
        let params = params.clone();
        async move {
            let Some(after) = cursor else {
                return Ok::<_, Error>(None);
            };
            let page = storage.raw_page(&table, &params, after, batch_size)?;
            let next = match page.last() {
                Some(last) if page.len() >= batch_size => Some(last.id),
                _ => None,
            };
            if page.is_empty() {
                return Ok(None);
            }
            Ok(Some((page, next)))
        }
    })
    .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, Error>)))
    .try_flatten()
    .boxed()
}

/// Tool rows of a partition in natural-key order
fn tool_rows<'a>(
    storage: &'a Storage,
    table: &'static str,
    params: String,
    batch_size: usize,
) -> BoxStream<'a, Result<ToolRow>> {
    stream::try_unfold(Some(String::new()), move |cursor| {
        let params = params.clone();
        async move {
            let Some(after) = cursor else {
                return Ok::<_, Error>(None);
            };
            let page = storage.tool_page(table, &params, &after, batch_size)?;
            let next = match page.last() {
                Some((key, _)) if page.len() >= batch_size => Some(key.clone()),
                _ => None,
            };
            if page.is_empty() {
                return Ok(None);
            }
            let rows: Vec<ToolRow> = page.into_iter().map(|(_, row)| row).collect();
            Ok(Some((rows, next)))
        }
    })
    .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, Error>)))
    .try_flatten()
    .boxed()
}

// ============================================================================
// Collector
// ============================================================================

/// Stores collected payloads in the stream's raw table
pub struct Collector<'s> {
    stream: &'s dyn AnyStream,
    raw_table: String,
    batch_size: usize,
}

impl<'s> Collector<'s> {
    pub fn new(stream: &'s dyn AnyStream, batch_size: usize) -> Self {
        Self {
            raw_table: stream.raw_table(),
            stream,
            batch_size,
        }
    }
}

#[async_trait]
impl Subtask for Collector<'_> {
    type Item = RawItem;

    fn phase(&self) -> Phase {
        Phase::Collect
    }

    fn stream(&self) -> &dyn AnyStream {
        self.stream
    }

    fn prepare(&self, ctx: &Context) -> Result<()> {
        ctx.storage.ensure_raw_table(&self.raw_table)?;
        if let Some(parent) = self.stream.parent_table() {
            ctx.storage.ensure_tool_table(parent)?;
        }
        Ok(())
    }

    fn delete(&self, ctx: &Context) -> Result<()> {
        let deleted = ctx.storage.delete_raw(&self.raw_table, &ctx.params())?;
        debug!(table = %self.raw_table, deleted, "Cleared raw rows of partition");
        Ok(())
    }

    fn total(&self, _ctx: &Context) -> Result<Option<u64>> {
        Ok(None)
    }

    fn fetch<'a>(
        &'a self,
        state: State,
        ctx: &'a Context,
    ) -> BoxStream<'a, Result<(RawItem, State)>> {
        match self.stream.parent_table() {
            None => self.stream.collect(state, ctx),
            Some(parent_table) => {
                let stream = self.stream;
                tool_rows(&ctx.storage, parent_table, ctx.params(), self.batch_size)
                    .map_ok(move |parent| stream.collect_for_parent(state.clone(), ctx, parent))
                    .try_flatten()
                    .boxed()
            }
        }
    }

    async fn process(&self, item: RawItem, ctx: &Context) -> Result<()> {
        let data = serde_json::to_vec(&item.data)?;
        let input = item.input.as_ref().map(ToString::to_string);
        ctx.storage.insert_raw(
            &self.raw_table,
            &ctx.params(),
            &data,
            item.url.as_deref(),
            input.as_deref(),
        )?;
        Ok(())
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// Parses the partition's raw rows into tool rows
pub struct Extractor<'s> {
    stream: &'s dyn AnyStream,
    raw_table: String,
    batch_size: usize,
}

impl<'s> Extractor<'s> {
    pub fn new(stream: &'s dyn AnyStream, batch_size: usize) -> Self {
        Self {
            raw_table: stream.raw_table(),
            stream,
            batch_size,
        }
    }
}

#[async_trait]
impl Subtask for Extractor<'_> {
    type Item = RawRecord;

    fn phase(&self) -> Phase {
        Phase::Extract
    }

    fn stream(&self) -> &dyn AnyStream {
        self.stream
    }

    fn prepare(&self, ctx: &Context) -> Result<()> {
        ctx.storage.ensure_raw_table(&self.raw_table)?;
        ctx.storage.ensure_tool_table(self.stream.tool_table())
    }

    fn delete(&self, ctx: &Context) -> Result<()> {
        let deleted = ctx
            .storage
            .delete_tool(self.stream.tool_table(), &ctx.params())?;
        debug!(table = self.stream.tool_table(), deleted, "Cleared tool rows of partition");
        Ok(())
    }

    fn total(&self, ctx: &Context) -> Result<Option<u64>> {
        ctx.storage
            .count_raw(&self.raw_table, &ctx.params())
            .map(Some)
    }

    fn fetch<'a>(
        &'a self,
        state: State,
        ctx: &'a Context,
    ) -> BoxStream<'a, Result<(RawRecord, State)>> {
        raw_rows(
            &ctx.storage,
            self.raw_table.clone(),
            ctx.params(),
            self.batch_size,
        )
        .map_ok(move |raw| (raw, state.clone()))
        .boxed()
    }

    async fn process(&self, raw: RawRecord, ctx: &Context) -> Result<()> {
        let origin = RawOrigin::from_raw(&self.raw_table, &raw);
        match self.stream.extract(raw.json()?, ctx.connection.id, origin)? {
            Some(row) => ctx.storage.upsert_tool(self.stream.tool_table(), &row),
            None => {
                debug!(table = %self.raw_table, raw_id = raw.id, "Extract skipped raw row");
                Ok(())
            }
        }
    }
}

// ============================================================================
// Convertor
// ============================================================================

/// Maps the partition's tool rows into domain rows
pub struct Convertor<'s> {
    stream: &'s dyn AnyStream,
    batch_size: usize,
}

impl<'s> Convertor<'s> {
    pub fn new(stream: &'s dyn AnyStream, batch_size: usize) -> Self {
        Self { stream, batch_size }
    }
}

#[async_trait]
impl Subtask for Convertor<'_> {
    type Item = ToolRow;

    fn phase(&self) -> Phase {
        Phase::Convert
    }

    fn stream(&self) -> &dyn AnyStream {
        self.stream
    }

    fn prepare(&self, ctx: &Context) -> Result<()> {
        ctx.storage.ensure_tool_table(self.stream.tool_table())
    }

    /// Domain rows are upserted by id, so nothing is removed up front
    fn delete(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    fn total(&self, ctx: &Context) -> Result<Option<u64>> {
        ctx.storage
            .count_tool(self.stream.tool_table(), &ctx.params())
            .map(Some)
    }

    fn fetch<'a>(
        &'a self,
        state: State,
        ctx: &'a Context,
    ) -> BoxStream<'a, Result<(ToolRow, State)>> {
        tool_rows(
            &ctx.storage,
            self.stream.tool_table(),
            ctx.params(),
            self.batch_size,
        )
        .map_ok(move |row| (row, state.clone()))
        .boxed()
    }

    async fn process(&self, row: ToolRow, ctx: &Context) -> Result<()> {
        for (table, domain) in self.stream.convert(&row, ctx).await? {
            ctx.storage.ensure_domain_table(table)?;
            ctx.storage.upsert_domain(table, &domain)?;
        }
        Ok(())
    }
}
