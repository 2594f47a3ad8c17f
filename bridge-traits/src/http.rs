//! HTTP contract for remote tracking adapters.
//!
//! Adapters build an [`HttpRequest`], hand it to the host's [`HttpClient`]
//! and classify the [`HttpResponse`] themselves: only transport failures are
//! errors at this layer.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Per-request timeout, overriding the client default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| BridgeError::OperationFailed(format!("request body: {}", e)))?;
        self.body = Some(Bytes::from(payload));
        Ok(self.header("Content-Type", "application/json"))
    }

    /// Encode `fields` as an `application/x-www-form-urlencoded` payload.
    pub fn form<T: Serialize + ?Sized>(mut self, fields: &T) -> Result<Self> {
        let payload = serde_urlencoded::to_string(fields)
            .map_err(|e| BridgeError::OperationFailed(format!("form body: {}", e)))?;
        self.body = Some(Bytes::from(payload));
        Ok(self.header("Content-Type", "application/x-www-form-urlencoded"))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BridgeError::OperationFailed(format!("response body: {}", e)))
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 5xx and 429: worth sending again later.
    pub fn is_retryable(&self) -> bool {
        self.status >= 500 || self.status == 429
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `Retry-After` in seconds, when the server sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("Retry-After")?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

/// Transport-level retry of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub use_exponential_backoff: bool,
}

impl RetryPolicy {
    /// Send once and report whatever comes back.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Pause after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.use_exponential_backoff {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.base_delay.saturating_mul(factor).min(self.max_delay)
        } else {
            self.base_delay.min(self.max_delay)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

/// Async HTTP client.
///
/// Non-2xx responses come back as `Ok`. Transport failures must be reported
/// as [`BridgeError::ConnectionFailed`] or [`BridgeError::Timeout`] so
/// callers can tell "offline" from "rejected".
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
///
/// let request = HttpRequest::new(HttpMethod::Post, "https://graphql.anilist.co")
///     .bearer_token(token)
///     .json(&serde_json::json!({ "query": "{ Viewer { id } }" }))?;
/// let response = client.execute_with_retry(request, RetryPolicy::single_attempt()).await?;
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute with the client's default retry policy.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }
}
