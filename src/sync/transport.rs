//! Resilient HTTP transport for remote API calls
//!
//! Every call to the remote API goes through [`ResilientTransport::execute`],
//! which layers, in order:
//!
//! - bearer credentials from the [`TokenProvider`], with a single re-auth on 401
//! - a per-call deadline around send and body read
//! - HTTP 429 handling that honors `Retry-After` on a budget of its own
//! - exponential backoff for transient failures via [`RetryPolicy`]

use crate::auth::TokenProvider;
use crate::config::{Config, RateLimitConfig, RetryConfig, TimeoutConfig};
use crate::error::{ApiError, AuthError, TransportError};
use crate::models::{Credential, FailureKind};
use crate::otel::SyncMetrics;
use crate::sync::retry::RetryPolicy;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Description of a single logical API call
#[derive(Clone)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Optional JSON body
    pub body: Option<serde_json::Value>,
    /// Deadline for one attempt (send plus body read)
    pub timeout: Duration,
    /// Label used in logs and metrics
    pub endpoint: &'static str,
    /// Attach a bearer credential
    pub auth: bool,
    /// Override of the transient-failure retry count for this call
    pub max_retries: Option<u32>,
}

impl RequestSpec {
    /// Create a request for the given method and URL
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: Duration::from_secs(30),
            endpoint: "api",
            auth: true,
            max_retries: None,
        }
    }

    /// GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the per-attempt deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the endpoint label
    pub fn with_endpoint(mut self, endpoint: &'static str) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Enable or disable bearer auth
    pub fn authenticated(mut self, auth: bool) -> Self {
        self.auth = auth;
        self
    }

    /// Override the retry count for this call
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

// Header values may carry credentials, so only names are printed.
impl std::fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("timeout", &self.timeout)
            .field("endpoint", &self.endpoint)
            .field("auth", &self.auth)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Successful (2xx) response
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body
    pub body: Bytes,
}

impl TransportResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| TransportError::InvalidResponse(format!("Failed to decode body: {}", e)))
    }
}

/// Build the shared reqwest client
pub fn build_http_client(timeouts: &TimeoutConfig) -> Result<Client, TransportError> {
    Client::builder()
        .connect_timeout(timeouts.connect())
        .user_agent(concat!("campaign-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// HTTP transport with deadlines, backoff, rate-limit handling and re-auth
#[derive(Debug, Clone)]
pub struct ResilientTransport {
    client: Client,
    retry: RetryPolicy,
    rate_limit: RateLimitConfig,
    tokens: Option<Arc<TokenProvider>>,
    metrics: Option<Arc<SyncMetrics>>,
}

impl ResilientTransport {
    /// Create an unauthenticated transport
    pub fn new(client: Client, retry: RetryConfig, rate_limit: RateLimitConfig) -> Self {
        Self {
            client,
            retry: RetryPolicy::new(retry),
            rate_limit,
            tokens: None,
            metrics: None,
        }
    }

    /// Create an unauthenticated transport from the application config
    pub fn from_config(client: Client, config: &Config) -> Self {
        Self::new(client, config.retry.clone(), config.rate_limit.clone())
    }

    /// Attach a token provider for requests that ask for bearer auth
    pub fn with_token_provider(mut self, tokens: Arc<TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Attach metrics instruments
    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Token provider, if attached
    pub fn token_provider(&self) -> Option<&Arc<TokenProvider>> {
        self.tokens.as_ref()
    }

    /// Execute a request with the full resilience stack
    ///
    /// Returns the first 2xx response. Permanent 4xx responses fail
    /// immediately, transient failures are retried with backoff, and 429
    /// responses wait out the server's hint without consuming the failure
    /// budget.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<TransportResponse, ApiError> {
        let started = Instant::now();
        let mut failures = 0u32;
        let mut rate_limited = 0u32;
        let mut reauthenticated = false;

        loop {
            // The token provider's own transport never carries a token
            // provider, so this edge recurses at most once.
            let credential = match (&self.tokens, spec.auth) {
                (Some(tokens), true) => Some(Box::pin(tokens.get_token()).await?),
                _ => None,
            };

            let err = match self.send_once(spec, credential.as_ref()).await {
                Ok(response) => {
                    let status = StatusCode::from_u16(response.status)
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

                    if status.is_success() {
                        debug!(
                            endpoint = spec.endpoint,
                            status = response.status,
                            retries = failures,
                            rate_limited = rate_limited,
                            "Request succeeded"
                        );
                        self.record_request(spec.endpoint, "success", started);
                        return Ok(response);
                    }

                    if status == StatusCode::UNAUTHORIZED {
                        if let (Some(tokens), Some(stale)) = (&self.tokens, &credential) {
                            if reauthenticated {
                                warn!(endpoint = spec.endpoint, "Fresh token rejected");
                                self.record_request(spec.endpoint, "auth", started);
                                return Err(AuthError::Rejected.into());
                            }
                            debug!(endpoint = spec.endpoint, "Token rejected, re-authenticating");
                            tokens.invalidate_if_current(stale).await;
                            reauthenticated = true;
                            continue;
                        }
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        rate_limited += 1;
                        if rate_limited > self.rate_limit.max_retries {
                            warn!(
                                endpoint = spec.endpoint,
                                attempts = rate_limited,
                                "Rate limit retries exhausted"
                            );
                            self.record_request(spec.endpoint, "rate_limited", started);
                            return Err(TransportError::RateLimitExhausted {
                                attempts: rate_limited,
                            }
                            .into());
                        }

                        let hint = parse_retry_after(&response.headers, Utc::now());
                        let wait = self.rate_limit_wait(spec.endpoint, hint);
                        warn!(
                            endpoint = spec.endpoint,
                            retry_after_secs = hint.map(|d| d.as_secs_f64()),
                            wait_ms = wait.as_millis() as u64,
                            attempt = rate_limited,
                            "Rate limited by remote"
                        );
                        self.record_retry(spec.endpoint, "rate_limited");
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if status.is_server_error() {
                        TransportError::ServerError(response.status)
                    } else {
                        TransportError::ClientError(response.status)
                    }
                }
                Err(err) => err,
            };

            match self.retry.next_delay(&err, failures, spec.max_retries) {
                Some(delay) => {
                    failures += 1;
                    warn!(
                        endpoint = spec.endpoint,
                        attempt = failures,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after transient error"
                    );
                    self.record_retry(spec.endpoint, "transient");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    if self.retry.is_transient(&err) {
                        warn!(
                            endpoint = spec.endpoint,
                            attempts = failures + 1,
                            error = %err,
                            "Max retries exhausted"
                        );
                    } else {
                        debug!(endpoint = spec.endpoint, error = %err, "Permanent failure");
                    }
                    let outcome = FailureKind::from(&err).to_string();
                    self.record_request(spec.endpoint, &outcome, started);
                    return Err(err.into());
                }
            }
        }
    }

    /// One attempt: send, read the body, all under the per-call deadline
    async fn send_once(
        &self,
        spec: &RequestSpec,
        credential: Option<&Credential>,
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.request(spec.method.clone(), &spec.url);
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(credential) = credential {
            request = request.header(AUTHORIZATION, credential.authorization_header());
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        let attempt = async {
            let response = request.send().await.map_err(map_reqwest_error)?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(map_reqwest_error)?;
            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        };

        match tokio::time::timeout(spec.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    endpoint = spec.endpoint,
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "Request deadline expired"
                );
                Err(TransportError::Timeout)
            }
        }
    }

    /// Wait before retrying a 429: the hint (or default) capped at
    /// `max_wait_secs`, plus the safety margin
    fn rate_limit_wait(&self, endpoint: &str, hint: Option<Duration>) -> Duration {
        let max_wait = Duration::from_secs(self.rate_limit.max_wait_secs);
        let requested = hint.unwrap_or(Duration::from_secs(self.rate_limit.default_wait_secs));
        if requested > max_wait {
            warn!(
                endpoint,
                requested_secs = requested.as_secs_f64(),
                max_wait_secs = self.rate_limit.max_wait_secs,
                "Retry-After exceeds the wait ceiling, clamping"
            );
        }
        requested.min(max_wait) + Duration::from_millis(self.rate_limit.safety_margin_ms)
    }

    fn record_request(&self, endpoint: &str, outcome: &str, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(endpoint, outcome, started.elapsed());
        }
    }

    fn record_retry(&self, endpoint: &str, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_retry(endpoint, reason);
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_decode() {
        TransportError::InvalidResponse(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

/// Parse a `Retry-After` header given as delta-seconds or an HTTP date
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
