//! Access token lifecycle
//!
//! The [`TokenProvider`] exchanges the configured account credentials for a
//! bearer token, caches it, and refreshes it shortly before it expires. The
//! cache lock is held across the exchange, so concurrent callers that find
//! the token stale share a single refresh.

use crate::config::Config;
use crate::error::{ApiError, AuthError, TransportError};
use crate::models::{Credential, TokenResponse};
use crate::sync::transport::{RequestSpec, ResilientTransport};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Path of the credential exchange endpoint
pub const AUTH_PATH: &str = "/auth/token";

/// Build an HTTP Basic authorization header value
pub fn basic_auth_header(email: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", email, password)))
}

/// Issues and caches bearer credentials
pub struct TokenProvider {
    transport: ResilientTransport,
    auth_url: String,
    authorization: String,
    timeout: Duration,
    refresh_buffer_secs: u64,
    cache: Mutex<Option<Credential>>,
    refreshes: AtomicU64,
}

impl TokenProvider {
    /// Create a token provider
    ///
    /// `transport` must not itself carry a token provider; the exchange uses
    /// Basic auth.
    pub fn new(transport: ResilientTransport, config: &Config) -> Self {
        let base = config.api.base_url.trim_end_matches('/');
        Self {
            transport,
            auth_url: format!("{}{}", base, AUTH_PATH),
            authorization: basic_auth_header(&config.api.email, &config.api.password),
            timeout: config.timeouts.auth(),
            refresh_buffer_secs: config.token.refresh_buffer_secs,
            cache: Mutex::new(None),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Return a usable credential, refreshing it when missing or near expiry
    pub async fn get_token(&self) -> Result<Credential, AuthError> {
        let mut cache = self.cache.lock().await;

        if let Some(credential) = cache.as_ref() {
            if credential.is_usable(self.refresh_buffer_secs) {
                return Ok(credential.clone());
            }
            debug!(expires_at = %credential.expires_at(), "Cached token near expiry");
        }

        let credential = self.refresh().await?;
        *cache = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the cached credential
    pub async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        if cache.take().is_some() {
            debug!("Cached token invalidated");
        }
    }

    /// Drop the cached credential only if it is still `stale`
    ///
    /// Workers that saw a 401 with the same token race here; only the first
    /// clears the cache, the rest pick up the replacement.
    pub async fn invalidate_if_current(&self, stale: &Credential) {
        let mut cache = self.cache.lock().await;
        if cache
            .as_ref()
            .is_some_and(|current| current.access_token == stale.access_token)
        {
            *cache = None;
            debug!("Rejected token invalidated");
        }
    }

    /// Number of credential exchanges performed
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        let spec = RequestSpec::post(self.auth_url.as_str())
            .with_header("Authorization", self.authorization.as_str())
            .with_timeout(self.timeout)
            .with_endpoint("auth")
            .authenticated(false);

        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let response = self.transport.execute(&spec).await.map_err(|e| match e {
            ApiError::Auth(err) => err,
            ApiError::Transport(TransportError::ClientError(status @ (401 | 403))) => {
                warn!(status, "Auth endpoint rejected credentials");
                AuthError::InvalidCredentials
            }
            ApiError::Transport(err) => {
                warn!(error = %err, "Auth endpoint unavailable");
                AuthError::Unavailable(err)
            }
        })?;

        let body: TokenResponse = response
            .json()
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        if body.access_token.is_empty() {
            return Err(AuthError::InvalidResponse("empty access_token".to_string()));
        }

        let credential = Credential::from_response(body, Utc::now());
        info!(expires_at = %credential.expires_at(), "Access token refreshed");
        Ok(credential)
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("auth_url", &self.auth_url)
            .field("refresh_buffer_secs", &self.refresh_buffer_secs)
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}
