//! API client with ordered hook chains
//!
//! Every call goes through the same pipeline:
//! - request hooks, in registration order, once per logical request
//! - send, with an explicit timeout
//! - response hooks, in registration order, on every attempt
//!
//! A `Retry` from a response hook resends the identical prepared request
//! after the requested wait, up to `max_rate_limit_retries` times.

use super::hooks::{
    RaiseForStatus, RateLimitHook, RequestAction, RequestHook, ResponseAction, ResponseHook,
    RetryOnTooManyRequests,
};
use super::rate_limit::{RateLimiter, RateLimiterConfig};
use super::types::{Request, Response};
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::pagination::{PagedResponse, Paginator};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    base_url: String,
    config: HttpConfig,
    proxy: Option<String>,
    default_hooks: bool,
    request_hooks: Vec<Arc<dyn RequestHook>>,
    response_hooks: Vec<Arc<dyn ResponseHook>>,
    paginator: Option<Arc<dyn Paginator>>,
}

impl ApiClientBuilder {
    /// Use HTTP settings from the runtime config
    #[must_use]
    pub fn config(mut self, config: &HttpConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Route every request through a proxy
    #[must_use]
    pub fn proxy(mut self, proxy: Option<impl Into<String>>) -> Self {
        self.proxy = proxy.map(Into::into).filter(|p: &String| !p.is_empty());
        self
    }

    /// Drop the built-in 429 retry and raise-for-status hooks
    #[must_use]
    pub fn without_default_hooks(mut self) -> Self {
        self.default_hooks = false;
        self
    }

    /// Append a request hook
    #[must_use]
    pub fn request_hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.request_hooks.push(Arc::new(hook));
        self
    }

    /// Append an already shared request hook
    #[must_use]
    pub fn request_hook_arc(mut self, hook: Arc<dyn RequestHook>) -> Self {
        self.request_hooks.push(hook);
        self
    }

    /// Append a response hook
    #[must_use]
    pub fn response_hook(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.response_hooks.push(Arc::new(hook));
        self
    }

    /// Append an already shared response hook
    #[must_use]
    pub fn response_hook_arc(mut self, hook: Arc<dyn ResponseHook>) -> Self {
        self.response_hooks.push(hook);
        self
    }

    /// Set the paginator used by [`ApiClient::get_paged`]
    #[must_use]
    pub fn paginator(mut self, paginator: impl Paginator + 'static) -> Self {
        self.paginator = Some(Arc::new(paginator));
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient> {
        let timeout = self.config.timeout();
        let client = self.http_client(timeout, false)?;
        let insecure_client = self.http_client(timeout, true)?;

        let mut request_hooks: Vec<Arc<dyn RequestHook>> = Vec::new();
        let mut response_hooks: Vec<Arc<dyn ResponseHook>> = Vec::new();
        if self.default_hooks {
            if let Some(budget) = RateLimiterConfig::from_http(&self.config) {
                request_hooks.push(Arc::new(RateLimitHook::new(RateLimiter::new(budget))));
            }
            response_hooks.push(Arc::new(RetryOnTooManyRequests::new(
                self.config.default_retry_after(),
            )));
            response_hooks.push(Arc::new(RaiseForStatus));
        }
        request_hooks.extend(self.request_hooks);
        response_hooks.extend(self.response_hooks);

        Ok(ApiClient {
            client,
            insecure_client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            timeout,
            max_rate_limit_retries: self.config.max_rate_limit_retries,
            request_hooks: Arc::new(request_hooks),
            response_hooks: Arc::new(response_hooks),
            paginator: self.paginator,
        })
    }

    fn http_client(&self, timeout: Duration, insecure: bool) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(&self.config.user_agent)
            .danger_accept_invalid_certs(insecure);
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }
        Ok(builder.build()?)
    }
}

/// HTTP client for one remote API
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    insecure_client: Client,
    base_url: String,
    timeout: Duration,
    max_rate_limit_retries: u32,
    request_hooks: Arc<Vec<Arc<dyn RequestHook>>>,
    response_hooks: Arc<Vec<Arc<dyn ResponseHook>>>,
    paginator: Option<Arc<dyn Paginator>>,
}

impl ApiClient {
    /// Start building a client for `base_url`
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            config: HttpConfig::default(),
            proxy: None,
            default_hooks: true,
            request_hooks: Vec::new(),
            response_hooks: Vec::new(),
            paginator: None,
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request for `base_url/seg1/seg2/...`
    pub fn request(&self, segments: &[&str]) -> Request {
        let mut url = self.base_url.clone();
        for segment in segments {
            let segment = segment.trim_matches('/');
            if segment.is_empty() {
                continue;
            }
            url.push('/');
            url.push_str(segment);
        }
        Request::new(url)
    }

    /// GET `base_url/segments...` with query parameters
    pub async fn get(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Response> {
        let mut request = self.request(segments);
        for (key, value) in query {
            request = request.query(*key, value);
        }
        self.send(request).await
    }

    /// Send a request through the hook chains
    pub async fn send(&self, request: Request) -> Result<Response> {
        let url = request.url.clone();
        let mut request = request;
        for hook in self.request_hooks.iter() {
            match hook.apply(request).await? {
                RequestAction::Continue(next) => request = next,
                RequestAction::Abort => return Err(Error::Aborted { url }),
            }
        }

        let mut retries = 0;
        loop {
            let response = self.execute(&request).await?;
            match self.apply_response_hooks(response).await? {
                ResponseAction::Continue(response) => return Ok(response),
                ResponseAction::Abort => return Err(Error::Aborted { url }),
                ResponseAction::Retry { after } => {
                    if retries >= self.max_rate_limit_retries {
                        return Err(Error::RateLimited { retries, url });
                    }
                    retries += 1;
                    warn!(
                        url = %url,
                        attempt = retries,
                        max_retries = self.max_rate_limit_retries,
                        wait_secs = after.as_secs_f64(),
                        "Rate limited, waiting before resending"
                    );
                    tokio::time::sleep(after).await;
                    for hook in self.request_hooks.iter() {
                        hook.before_resend().await?;
                    }
                }
            }
        }
    }

    /// Send a request and wrap the response for page-by-page iteration
    pub async fn get_paged(&self, request: Request) -> Result<PagedResponse> {
        let paginator = self
            .paginator
            .clone()
            .ok_or_else(|| Error::config(format!("no paginator configured for {}", self.base_url)))?;
        let first = self.send(request).await?;
        Ok(PagedResponse::new(self.clone(), paginator, first))
    }

    async fn apply_response_hooks(&self, mut response: Response) -> Result<ResponseAction> {
        for hook in self.response_hooks.iter() {
            match hook.apply(response).await? {
                ResponseAction::Continue(next) => response = next,
                other => return Ok(other),
            }
        }
        Ok(ResponseAction::Continue(response))
    }

    async fn execute(&self, request: &Request) -> Result<Response> {
        let url = request.full_url()?;
        let client = if request.verify {
            &self.client
        } else {
            &self.insecure_client
        };

        let mut builder = client.get(url.clone()).timeout(self.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| self.map_send_error(e))?;

        debug!(url = %url, status, bytes = body.len(), "Received response");

        Ok(Response {
            request: request.clone(),
            status,
            headers,
            body,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            Error::Http(e)
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_rate_limit_retries", &self.max_rate_limit_retries)
            .field("request_hooks", &self.request_hooks.len())
            .field("response_hooks", &self.response_hooks.len())
            .field("has_paginator", &self.paginator.is_some())
            .finish()
    }
}
