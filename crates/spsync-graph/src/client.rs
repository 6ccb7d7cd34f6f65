//! Microsoft Graph API client
//!
//! Provides a typed HTTP client for interacting with the Microsoft Graph API.
//! Handles authentication headers, base URL construction, throttle telemetry
//! and the transport retry policy shared by every Graph call.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reqwest::Method;
//! use spsync_graph::client::GraphClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = GraphClient::new("access-token-here");
//! let response = client.execute(Method::GET, "/sites/root", |r| r).await?;
//! println!("status {}", response.status());
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use spsync_core::retry::RetryPolicy;
use tracing::{debug, info, warn};

use crate::auth::{AccessTokenSource, StaticToken};
use crate::rate_limit::{parse_retry_after, RateLimitMonitor};
use crate::{error_from_response, GraphError};

/// Base URL for Microsoft Graph API v1.0
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

// ============================================================================
// TransportRetry
// ============================================================================

/// Retry settings applied to every Graph request.
///
/// Delays are expressed in multiples of `unit` (one second in production):
/// 5xx and network errors wait `2^n + 1` units, 409 waits `2^n + 2` units and
/// proactive pacing waits `2^n` units before attempt `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportRetry {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    /// Wait used when a 429 carries no usable Retry-After header
    pub default_retry_after: Duration,
    /// Base unit of the exponential delays
    pub unit: Duration,
}

impl Default for TransportRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_retry_after: Duration::from_secs(60),
            unit: Duration::from_secs(1),
        }
    }
}

impl TransportRetry {
    fn server_error(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts, self.unit, self.unit)
    }

    fn conflict(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts, self.unit, self.unit * 2)
    }

    fn pacing(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts, self.unit, Duration::ZERO)
    }
}

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with authentication headers and base URL
/// construction. The base URL is a construction-time parameter, which is how
/// sovereign clouds (`graph.microsoft.us`, ...) and test servers are targeted.
///
/// Every response is fed to the shared [`RateLimitMonitor`].
#[derive(Clone)]
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Supplier of bearer tokens
    tokens: Arc<dyn AccessTokenSource>,
    /// Run-wide throttle telemetry
    monitor: Arc<RateLimitMonitor>,
    retry: TransportRetry,
}

impl GraphClient {
    /// Creates a new GraphClient with the given access token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, GRAPH_BASE_URL)
    }

    /// Creates a new GraphClient with a custom base URL (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_token_source(Arc::new(StaticToken::new(access_token)), base_url)
    }

    /// Creates a client drawing tokens from `tokens`.
    pub fn with_token_source(
        tokens: Arc<dyn AccessTokenSource>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            monitor: Arc::new(RateLimitMonitor::new()),
            retry: TransportRetry::default(),
        }
    }

    /// Base URL for a graph endpoint host, e.g. `graph.microsoft.com`.
    pub fn base_url_for(graph_endpoint: &str) -> String {
        format!("https://{graph_endpoint}/v1.0")
    }

    /// Replaces the transport retry settings.
    pub fn with_retry(mut self, retry: TransportRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Shares an existing monitor instead of the client's own.
    pub fn with_monitor(mut self, monitor: Arc<RateLimitMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Returns the throttle telemetry monitor.
    pub fn monitor(&self) -> &Arc<RateLimitMonitor> {
        &self.monitor
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the transport retry settings.
    pub fn retry(&self) -> TransportRetry {
        self.retry
    }

    /// Returns a reference to the underlying HTTP client
    ///
    /// Upload session URLs are absolute, pre-authorized and must not carry
    /// the Graph bearer token, so chunk uploads use the raw client.
    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// `path` is relative to the base URL unless it is already absolute
    /// (e.g. an `@odata.nextLink`).
    pub async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GraphError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| GraphError::Auth(format!("{e:#}")))?;
        Ok(self.client.request(method, self.url(path)).bearer_auth(token))
    }

    // ========================================================================
    // Transport retry
    // ========================================================================

    /// Executes a request with the transport retry policy.
    ///
    /// `customize` adds headers and body; it runs once per attempt. 429,
    /// 5xx, 409 and network errors are retried. Any other response,
    /// including 4xx errors, is returned to the caller unchanged.
    pub async fn execute<F>(&self, method: Method, path: &str, customize: F) -> Result<Response, GraphError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        self.execute_inner(method, path, customize, true).await
    }

    /// Like [`execute`](Self::execute), but a 409 is returned immediately.
    ///
    /// Used where the conflict is the answer, such as folder creation.
    pub async fn execute_allowing_conflict<F>(
        &self,
        method: Method,
        path: &str,
        customize: F,
    ) -> Result<Response, GraphError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        self.execute_inner(method, path, customize, false).await
    }

    async fn execute_inner<F>(
        &self,
        method: Method,
        path: &str,
        customize: F,
        retry_conflict: bool,
    ) -> Result<Response, GraphError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 && self.monitor.should_slow_down() {
                let pause = self.retry.pacing().delay_for(attempt);
                debug!(path, attempt, pause_ms = pause.as_millis() as u64, "High utilization, pacing request");
                tokio::time::sleep(pause).await;
            }

            let last = attempt + 1 >= max_attempts;
            let request = customize(self.request(method.clone(), path).await?);

            let delay = match request.send().await {
                Ok(response) => {
                    self.monitor.observe(response.headers());
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .map(|v| parse_retry_after(v, self.retry.default_retry_after))
                            .unwrap_or(self.retry.default_retry_after);
                        if last {
                            warn!(path, attempts = attempt + 1, "429 retry limit exhausted");
                            return Err(GraphError::TooManyRequests { retry_after });
                        }
                        info!(
                            path,
                            attempt,
                            retry_after_ms = retry_after.as_millis() as u64,
                            "Received 429, backing off"
                        );
                        retry_after
                    } else if status.is_server_error() {
                        if last {
                            warn!(path, %status, attempts = attempt + 1, "Server error retry limit exhausted");
                            return Err(error_from_response(response).await);
                        }
                        let delay = self.retry.server_error().delay_for(attempt);
                        warn!(path, %status, attempt, delay_ms = delay.as_millis() as u64, "Server error, retrying");
                        delay
                    } else if status == StatusCode::CONFLICT && retry_conflict {
                        if last {
                            return Ok(response);
                        }
                        let delay = self.retry.conflict().delay_for(attempt);
                        info!(path, attempt, delay_ms = delay.as_millis() as u64, "Conflict, retrying");
                        delay
                    } else {
                        if attempt > 0 {
                            info!(path, attempt, %status, "Request succeeded after retry");
                        }
                        return Ok(response);
                    }
                }
                Err(e) => {
                    if last {
                        warn!(path, attempts = attempt + 1, error = %e, "Network error retry limit exhausted");
                        return Err(GraphError::NetworkError(e));
                    }
                    let delay = self.retry.server_error().delay_for(attempt);
                    warn!(path, attempt, error = %e, delay_ms = delay.as_millis() as u64, "Network error, retrying");
                    delay
                }
            };

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    // ========================================================================
    // JSON helpers
    // ========================================================================

    /// GETs `path` and deserializes a successful JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(Method::GET, path, |r| r).await?;
        Self::json_or_error(response, path).await
    }

    /// Deserializes a successful response, or converts an error status.
    pub(crate) async fn json_or_error<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        if !response.status().is_success() {
            return Err(error_from_response(response).await)
                .with_context(|| format!("Request failed: {what}"));
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response of {what}"))
    }
}
