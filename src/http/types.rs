//! Request and response values passed through the hook chains
//!
//! Both are plain data: hooks receive them by value and hand back a
//! (possibly modified) copy, so a prepared request can be resent verbatim.

use crate::error::{Error, Result};
use crate::types::JsonValue;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// A prepared GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Absolute URL without the query string built from `query`
    pub url: String,
    /// Query parameters, kept ordered so the final URL is stable
    pub query: BTreeMap<String, String>,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Whether TLS certificates are verified
    pub verify: bool,
}

impl Request {
    /// Create a request for an absolute URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: BTreeMap::new(),
            headers: HashMap::new(),
            verify: true,
        }
    }

    /// Add or replace a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(key.into(), value.to_string());
        self
    }

    /// Add or replace a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Skip TLS certificate verification
    #[must_use]
    pub fn insecure(mut self) -> Self {
        self.verify = false;
        self
    }

    /// Final URL with the query string appended
    pub fn full_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// A received response, fully buffered
#[derive(Debug, Clone)]
pub struct Response {
    /// The request that produced this response
    pub request: Request,
    /// HTTP status code
    pub status: u16,
    /// Response headers with lower-cased names
    pub headers: HashMap<String, String>,
    /// Raw body
    pub body: Bytes,
}

impl Response {
    /// Look up a header, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8 (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::decode(format!(
                "invalid JSON from {} (HTTP {}): {e}",
                self.request.url, self.status
            ))
        })
    }

    /// Body as a JSON value; an empty body is `null`
    pub fn json_value(&self) -> Result<JsonValue> {
        if self.body.is_empty() {
            return Ok(JsonValue::Null);
        }
        self.json()
    }
}
