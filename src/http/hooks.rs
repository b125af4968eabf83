//! Request and response hooks
//!
//! Hooks run in the order they were registered on the client. A request hook
//! can rewrite or abort the outgoing request; a response hook can pass the
//! response on, ask for the same request to be resent, or abort.

use super::rate_limit::RateLimiter;
use super::types::{Request, Response};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a request hook
#[derive(Debug)]
pub enum RequestAction {
    /// Send this (possibly rewritten) request
    Continue(Request),
    /// Do not send anything
    Abort,
}

/// Outcome of a response hook
#[derive(Debug)]
pub enum ResponseAction {
    /// Hand the response to the next hook
    Continue(Response),
    /// Wait and resend the identical request
    Retry {
        /// How long to wait before resending
        after: Duration,
    },
    /// Stop and fail the call
    Abort,
}

/// Hook applied to every outgoing request
#[async_trait]
pub trait RequestHook: Send + Sync {
    async fn apply(&self, request: Request) -> Result<RequestAction>;

    /// Called before a throttled request is resent. The prepared request
    /// is resent unchanged, so `apply` is not run again.
    async fn before_resend(&self) -> Result<()> {
        Ok(())
    }
}

/// Hook applied to every received response
#[async_trait]
pub trait ResponseHook: Send + Sync {
    async fn apply(&self, response: Response) -> Result<ResponseAction>;
}

// ============================================================================
// Built-in response hooks
// ============================================================================

/// Turns a 429 into a retry after the server's Retry-After
#[derive(Debug, Clone)]
pub struct RetryOnTooManyRequests {
    default_after: Duration,
}

impl RetryOnTooManyRequests {
    pub fn new(default_after: Duration) -> Self {
        Self { default_after }
    }
}

impl Default for RetryOnTooManyRequests {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl ResponseHook for RetryOnTooManyRequests {
    async fn apply(&self, response: Response) -> Result<ResponseAction> {
        if response.status != 429 {
            return Ok(ResponseAction::Continue(response));
        }
        let after = response
            .header("retry-after")
            .and_then(parse_retry_after)
            .unwrap_or(self.default_after);
        Ok(ResponseAction::Retry { after })
    }
}

/// Parse a Retry-After value: delta-seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Fails the call for any status >= 400
#[derive(Debug, Clone, Copy, Default)]
pub struct RaiseForStatus;

#[async_trait]
impl ResponseHook for RaiseForStatus {
    async fn apply(&self, response: Response) -> Result<ResponseAction> {
        if response.status >= 400 {
            let url = response
                .request
                .full_url()
                .map_or_else(|_| response.request.url.clone(), |u| u.to_string());
            return Err(Error::api(response.status, url, response.text()));
        }
        Ok(ResponseAction::Continue(response))
    }
}

// ============================================================================
// Built-in request hooks
// ============================================================================

/// Sets a static header on every request
#[derive(Debug, Clone)]
pub struct HeaderHook {
    name: String,
    value: String,
}

impl HeaderHook {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl RequestHook for HeaderHook {
    async fn apply(&self, request: Request) -> Result<RequestAction> {
        Ok(RequestAction::Continue(
            request.header(&self.name, &self.value),
        ))
    }
}

/// Sets a static query parameter (e.g. `api-version`) unless already present
#[derive(Debug, Clone)]
pub struct QueryParamHook {
    name: String,
    value: String,
}

impl QueryParamHook {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl RequestHook for QueryParamHook {
    async fn apply(&self, mut request: Request) -> Result<RequestAction> {
        request
            .query
            .entry(self.name.clone())
            .or_insert_with(|| self.value.clone());
        Ok(RequestAction::Continue(request))
    }
}

/// HTTP basic authentication
#[derive(Clone)]
pub struct BasicAuthHook {
    header: String,
}

impl BasicAuthHook {
    pub fn new(username: &str, password: &str) -> Self {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
        Self {
            header: format!("Basic {encoded}"),
        }
    }
}

impl fmt::Debug for BasicAuthHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthHook").finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestHook for BasicAuthHook {
    async fn apply(&self, request: Request) -> Result<RequestAction> {
        Ok(RequestAction::Continue(
            request.header("Authorization", &self.header),
        ))
    }
}

/// Bearer token authentication
#[derive(Clone)]
pub struct BearerAuthHook {
    token: String,
}

impl BearerAuthHook {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerAuthHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthHook").finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestHook for BearerAuthHook {
    async fn apply(&self, request: Request) -> Result<RequestAction> {
        Ok(RequestAction::Continue(
            request.header("Authorization", format!("Bearer {}", self.token)),
        ))
    }
}

/// Waits on a token bucket before each request
#[derive(Debug, Clone)]
pub struct RateLimitHook {
    limiter: RateLimiter,
}

impl RateLimitHook {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl RequestHook for RateLimitHook {
    async fn apply(&self, request: Request) -> Result<RequestAction> {
        self.limiter.wait().await;
        Ok(RequestAction::Continue(request))
    }

    /// Every resend spends a permit too
    async fn before_resend(&self) -> Result<()> {
        self.limiter.wait().await;
        Ok(())
    }
}

// ============================================================================
// Closure hooks
// ============================================================================

struct FnRequestHook<F>(F);

#[async_trait]
impl<F> RequestHook for FnRequestHook<F>
where
    F: Fn(Request) -> Result<RequestAction> + Send + Sync,
{
    async fn apply(&self, request: Request) -> Result<RequestAction> {
        (self.0)(request)
    }
}

struct FnResponseHook<F>(F);

#[async_trait]
impl<F> ResponseHook for FnResponseHook<F>
where
    F: Fn(Response) -> Result<ResponseAction> + Send + Sync,
{
    async fn apply(&self, response: Response) -> Result<ResponseAction> {
        (self.0)(response)
    }
}

/// Wrap a synchronous closure as a request hook
pub fn request_fn<F>(f: F) -> Arc<dyn RequestHook>
where
    F: Fn(Request) -> Result<RequestAction> + Send + Sync + 'static,
{
    Arc::new(FnRequestHook(f))
}

/// Wrap a synchronous closure as a response hook
pub fn response_fn<F>(f: F) -> Arc<dyn ResponseHook>
where
    F: Fn(Response) -> Result<ResponseAction> + Send + Sync + 'static,
{
    Arc::new(FnResponseHook(f))
}
