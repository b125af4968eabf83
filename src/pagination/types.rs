//! Pagination types and traits
//!
//! A [`Paginator`] knows three things about a paged API: where the items of
//! a page live, how to find the next page id, and how to ask for that page.
//! [`PagedResponse`] drives it lazily: page N+1 is only requested once every
//! item of page N has been consumed.

use crate::error::{Error, Result};
use crate::http::{ApiClient, Request, Response};
use crate::types::JsonValue;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Identifier of the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageId {
    /// Page number or offset
    Number(u64),
    /// Opaque continuation token
    Token(String),
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Token(t) => f.write_str(t),
        }
    }
}

/// Pagination contract
pub trait Paginator: Send + Sync + fmt::Debug {
    /// Items of a page, or `None` when the body is not a paged envelope
    fn items(&self, response: &Response) -> Result<Option<Vec<JsonValue>>>;

    /// Id of the page after this one, `None` on the last page
    fn next_page_id(&self, response: &Response) -> Result<Option<PageId>>;

    /// Rewrite `request` so it fetches `page_id`
    fn set_next_page_param(&self, request: &mut Request, page_id: &PageId);
}

/// Look up a dotted path (`value`, `data.items`, `$.data.items`) in a JSON value
pub fn extract_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let path = path.trim_start_matches('$').trim_start_matches('.');
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, key| match current {
        JsonValue::Object(map) => map.get(key),
        JsonValue::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Items found at `path` in the response body.
///
/// A missing path or a non-object body means the response is not an envelope
/// (`None`); `null` at the path is an empty page.
pub fn items_at(response: &Response, path: &str) -> Result<Option<Vec<JsonValue>>> {
    let body = response.json_value()?;
    match extract_path(&body, path) {
        None => Ok(None),
        Some(JsonValue::Null) => Ok(Some(Vec::new())),
        Some(JsonValue::Array(items)) => Ok(Some(items.clone())),
        Some(other) => Err(Error::decode(format!(
            "expected an array at '{path}' in response from {}, found {}",
            response.request.url,
            type_name(other)
        ))),
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Treat a non-envelope body as a single page
fn whole_body(response: &Response) -> Result<Vec<JsonValue>> {
    Ok(match response.json_value()? {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(items) => items,
        other => vec![other],
    })
}

// ============================================================================
// Paged response
// ============================================================================

/// A response whose items may continue on further pages
#[derive(Debug, Clone)]
pub struct PagedResponse {
    client: ApiClient,
    paginator: Arc<dyn Paginator>,
    first: Response,
}

enum Cursor {
    First(Response),
    Next(Request),
    Done,
}

impl PagedResponse {
    pub fn new(client: ApiClient, paginator: Arc<dyn Paginator>, first: Response) -> Self {
        Self {
            client,
            paginator,
            first,
        }
    }

    /// The first page's response
    pub fn first(&self) -> &Response {
        &self.first
    }

    /// Lazily iterate the items of every page.
    ///
    /// Each call starts over from the first page; iterators do not share a cursor.
    pub fn items(&self) -> BoxStream<'static, Result<JsonValue>> {
        let client = self.client.clone();
        let paginator = Arc::clone(&self.paginator);
        let init = Cursor::First(self.first.clone());

        stream::try_unfold(init, move |cursor| {
            let client = client.clone();
            let paginator = Arc::clone(&paginator);
            async move { next_page(&client, paginator.as_ref(), cursor).await }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
        .boxed()
    }

    /// Collect every item of every page
    pub async fn collect_all(&self) -> Result<Vec<JsonValue>> {
        self.items().try_collect().await
    }
}

async fn next_page(
    client: &ApiClient,
    paginator: &dyn Paginator,
    cursor: Cursor,
) -> Result<Option<(Vec<JsonValue>, Cursor)>> {
    let response = match cursor {
        Cursor::First(response) => response,
        Cursor::Next(request) => client.send(request).await?,
        Cursor::Done => return Ok(None),
    };

    let Some(items) = paginator.items(&response)? else {
        return Ok(Some((whole_body(&response)?, Cursor::Done)));
    };

    let next = match paginator.next_page_id(&response)? {
        Some(page_id) => {
            let mut request = response.request.clone();
            paginator.set_next_page_param(&mut request, &page_id);
            if request == response.request {
                debug!(url = %request.url, "Next page request unchanged, stopping");
                Cursor::Done
            } else {
                debug!(url = %request.url, page = %page_id, "Fetching next page");
                Cursor::Next(request)
            }
        }
        None => Cursor::Done,
    };

    Ok(Some((items, next)))
}
