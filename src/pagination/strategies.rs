//! Pagination strategy implementations
//!
//! Each strategy handles a specific pagination pattern.

use super::types::{extract_path, items_at, PageId, Paginator};
use crate::error::Result;
use crate::http::{Request, Response};
use crate::types::JsonValue;

// ============================================================================
// Token Pagination
// ============================================================================

/// Where a continuation token is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Dotted path in the response body
    Body(String),
    /// Response header (case-insensitive)
    Header(String),
}

/// Continuation-token pagination
///
/// The token from each response is sent back as a query parameter.
/// Common patterns:
/// - Azure DevOps: `x-ms-continuationtoken` header → `?continuationToken=`
/// - body `nextPageToken` → `?pageToken=`
#[derive(Debug, Clone)]
pub struct TokenPaginator {
    /// Path to the items array
    pub items_path: String,
    /// Where the next token comes from
    pub token_source: TokenSource,
    /// Query parameter that carries the token
    pub token_param: String,
}

impl TokenPaginator {
    /// Token read from the response body
    pub fn body(
        items_path: impl Into<String>,
        token_path: impl Into<String>,
        token_param: impl Into<String>,
    ) -> Self {
        Self {
            items_path: items_path.into(),
            token_source: TokenSource::Body(token_path.into()),
            token_param: token_param.into(),
        }
    }

    /// Token read from a response header
    pub fn header(
        items_path: impl Into<String>,
        header: impl Into<String>,
        token_param: impl Into<String>,
    ) -> Self {
        Self {
            items_path: items_path.into(),
            token_source: TokenSource::Header(header.into()),
            token_param: token_param.into(),
        }
    }
}

impl Paginator for TokenPaginator {
    fn items(&self, response: &Response) -> Result<Option<Vec<JsonValue>>> {
        items_at(response, &self.items_path)
    }

    fn next_page_id(&self, response: &Response) -> Result<Option<PageId>> {
        let token = match &self.token_source {
            TokenSource::Header(name) => response.header(name).map(ToString::to_string),
            TokenSource::Body(path) => {
                let body = response.json_value()?;
                extract_path(&body, path).and_then(|v| match v {
                    JsonValue::String(s) => Some(s.clone()),
                    JsonValue::Number(n) => Some(n.to_string()),
                    _ => None,
                })
            }
        };
        Ok(token.filter(|t| !t.is_empty()).map(PageId::Token))
    }

    fn set_next_page_param(&self, request: &mut Request, page_id: &PageId) {
        request
            .query
            .insert(self.token_param.clone(), page_id.to_string());
    }
}

// ============================================================================
// Page Number Pagination
// ============================================================================

/// Page number pagination
///
/// Increments a page number until a short or empty page.
/// Common patterns:
/// - `?page=2&per_page=100`
#[derive(Debug, Clone)]
pub struct PageNumberPaginator {
    /// Path to the items array
    pub items_path: String,
    /// Query parameter name for page number
    pub page_param: String,
    /// First page number (usually 0 or 1)
    pub start_page: u64,
    /// Page size parameter and value; a shorter page ends pagination
    pub page_size: Option<(String, u64)>,
}

impl PageNumberPaginator {
    pub fn new(items_path: impl Into<String>, page_param: impl Into<String>, start_page: u64) -> Self {
        Self {
            items_path: items_path.into(),
            page_param: page_param.into(),
            start_page,
            page_size: None,
        }
    }

    /// Send a page size and stop on the first short page
    #[must_use]
    pub fn with_page_size(mut self, param: impl Into<String>, size: u64) -> Self {
        self.page_size = Some((param.into(), size));
        self
    }

    /// Parameters for the first request
    pub fn initial_request(&self, request: Request) -> Request {
        let request = request.query(&self.page_param, self.start_page);
        match &self.page_size {
            Some((param, size)) => request.query(param, size),
            None => request,
        }
    }

    fn current_page(&self, request: &Request) -> u64 {
        request
            .query
            .get(&self.page_param)
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.start_page)
    }
}

impl Paginator for PageNumberPaginator {
    fn items(&self, response: &Response) -> Result<Option<Vec<JsonValue>>> {
        items_at(response, &self.items_path)
    }

    fn next_page_id(&self, response: &Response) -> Result<Option<PageId>> {
        let count = self.items(response)?.map_or(0, |items| items.len() as u64);
        if count == 0 {
            return Ok(None);
        }
        if let Some((_, size)) = &self.page_size {
            if count < *size {
                return Ok(None);
            }
        }
        Ok(Some(PageId::Number(self.current_page(&response.request) + 1)))
    }

    fn set_next_page_param(&self, request: &mut Request, page_id: &PageId) {
        request
            .query
            .insert(self.page_param.clone(), page_id.to_string());
        if let Some((param, size)) = &self.page_size {
            request.query.insert(param.clone(), size.to_string());
        }
    }
}

// ============================================================================
// Offset Pagination
// ============================================================================

/// Offset-based pagination
///
/// Uses offset and limit parameters to paginate.
/// Common patterns:
/// - `?$skip=100&$top=50`
/// - `?offset=100&limit=50`
#[derive(Debug, Clone)]
pub struct OffsetPaginator {
    /// Path to the items array
    pub items_path: String,
    /// Query parameter name for offset
    pub offset_param: String,
    /// Query parameter name for limit
    pub limit_param: String,
    /// Number of records per page
    pub limit: u64,
}

impl OffsetPaginator {
    pub fn new(
        items_path: impl Into<String>,
        offset_param: impl Into<String>,
        limit_param: impl Into<String>,
        limit: u64,
    ) -> Self {
        Self {
            items_path: items_path.into(),
            offset_param: offset_param.into(),
            limit_param: limit_param.into(),
            limit,
        }
    }

    /// Parameters for the first request
    pub fn initial_request(&self, request: Request) -> Request {
        request
            .query(&self.offset_param, 0)
            .query(&self.limit_param, self.limit)
    }
}

impl Paginator for OffsetPaginator {
    fn items(&self, response: &Response) -> Result<Option<Vec<JsonValue>>> {
        items_at(response, &self.items_path)
    }

    fn next_page_id(&self, response: &Response) -> Result<Option<PageId>> {
        let count = self.items(response)?.map_or(0, |items| items.len() as u64);
        if count < self.limit || count == 0 {
            return Ok(None);
        }
        let offset: u64 = response
            .request
            .query
            .get(&self.offset_param)
            .and_then(|o| o.parse().ok())
            .unwrap_or(0);
        Ok(Some(PageId::Number(offset + count)))
    }

    fn set_next_page_param(&self, request: &mut Request, page_id: &PageId) {
        request
            .query
            .insert(self.offset_param.clone(), page_id.to_string());
        request
            .query
            .insert(self.limit_param.clone(), self.limit.to_string());
    }
}
