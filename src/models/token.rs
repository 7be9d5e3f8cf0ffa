//! Credential models
//!
//! This module defines the access token issued by the remote auth endpoint
//! and the cached credential derived from it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Body returned by `POST /auth/token`
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Opaque bearer token
    pub access_token: String,

    /// Token type, normally `Bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime in seconds
    pub expires_in: u64,

    /// Server issue time; accepted for completeness, never used for expiry math
    #[serde(default)]
    pub issued_at: Option<serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Cached access credential
///
/// Owned by the token provider. `issued_at` is the local time the token was
/// received, so skew between client and server clocks cannot extend its life.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Opaque bearer token
    pub access_token: String,

    /// Token type
    pub token_type: String,

    /// Local receipt time
    pub issued_at: DateTime<Utc>,

    /// Lifetime in seconds
    pub expires_in: u64,
}

impl Credential {
    /// Build a credential from a token response received at `issued_at`
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            issued_at,
            expires_in: response.expires_in,
        }
    }

    /// Absolute expiry time
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at
            .checked_add_signed(seconds(self.expires_in))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Check whether the credential can still be used at `now`, keeping
    /// `refresh_buffer_secs` of headroom before the real expiry
    pub fn is_usable_at(&self, now: DateTime<Utc>, refresh_buffer_secs: u64) -> bool {
        match self.expires_at().checked_sub_signed(seconds(refresh_buffer_secs)) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }

    /// Check whether the credential can still be used now
    pub fn is_usable(&self, refresh_buffer_secs: u64) -> bool {
        self.is_usable_at(Utc::now(), refresh_buffer_secs)
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

fn seconds(secs: u64) -> Duration {
    // chrono durations are limited to i64 milliseconds
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    Duration::seconds(secs)
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
