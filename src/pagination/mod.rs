//! Pagination module
//!
//! Supports: continuation token (body or header), page number, offset
//!
//! # Overview
//!
//! Streams call [`crate::http::ApiClient::get_paged`] and iterate
//! [`PagedResponse::items`]. The configured [`Paginator`] extracts the items of
//! each page and decides whether and how to request the next one. Iteration
//! stops when there is no next page id, when the next request would repeat
//! the previous one, or when the body is not a paged envelope at all. An
//! empty page that still carries a next page id does not end iteration.

mod strategies;
mod types;

pub use strategies::{OffsetPaginator, PageNumberPaginator, TokenPaginator, TokenSource};
pub use types::{extract_path, items_at, PageId, PagedResponse, Paginator};
