//! HTTP client module
//!
//! Provides the API client used by stream collectors.
//!
//! # Features
//!
//! - **Hook Chains**: Ordered request and response hooks, declared order is execution order
//! - **429 Handling**: Honors Retry-After and resends the identical request, with a cap
//! - **Raise For Status**: Any status >= 400 surfaces as [`crate::Error::Api`]
//! - **Rate Limiting**: Optional token bucket using governor
//! - **Pagination**: `get_paged` wraps responses for lazy page-by-page iteration

mod client;
mod hooks;
mod rate_limit;
mod types;

pub use client::{ApiClient, ApiClientBuilder};
pub use hooks::{
    parse_retry_after, request_fn, response_fn, BasicAuthHook, BearerAuthHook, HeaderHook,
    QueryParamHook, RaiseForStatus, RateLimitHook, RequestAction, RequestHook, ResponseAction,
    ResponseHook, RetryOnTooManyRequests,
};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use types::{Request, Response};
