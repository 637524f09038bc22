//! Access-token claims parser.
//!
//! Decodes the payload segment of a JWT without verifying its signature:
//! the client only needs the expiry and identity claims to schedule
//! refreshes and derive session flags. Verification is the server's job.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Why a token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimsError {
    /// The token does not have the `header.payload.signature` shape.
    #[error("token is not a three-part JWT")]
    Malformed,

    /// The payload segment is not valid base64url.
    #[error("payload is not base64url: {0}")]
    Encoding(String),

    /// The payload is not a JSON claims object.
    #[error("payload is not valid claims JSON: {0}")]
    Json(String),

    /// The `exp` claim is out of the representable range.
    #[error("expiry claim out of range: {0}")]
    ExpiryOutOfRange(i64),
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    exp: i64,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    nameid: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role")]
    role: Option<serde_json::Value>,
}

/// Claims extracted from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiry instant (`exp`).
    pub expires_at: DateTime<Utc>,
    /// User identifier (`sub`, falling back to `nameid`).
    pub subject: Option<String>,
    /// E-mail claim, when present.
    pub email: Option<String>,
    /// First role claim, when present.
    pub role: Option<String>,
}

impl TokenClaims {
    /// Decodes the claims of `token`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClaimsError`] describing the first decoding step that
    /// failed. Never panics on arbitrary input.
    pub fn parse(token: &str) -> Result<Self, ClaimsError> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ClaimsError::Malformed);
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ClaimsError::Encoding(e.to_string()))?;
        let raw: RawClaims =
            serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Json(e.to_string()))?;

        let expires_at =
            DateTime::from_timestamp(raw.exp, 0).ok_or(ClaimsError::ExpiryOutOfRange(raw.exp))?;

        Ok(Self {
            expires_at,
            subject: raw.sub.or(raw.nameid),
            email: raw.email,
            role: raw.role.as_ref().and_then(first_role),
        })
    }

    /// Returns `true` when less than `margin` of lifetime remains at `now`.
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now < margin
    }
}

/// Returns `true` if `token` should be refreshed before use: it is inside
/// the safety margin, already expired, or cannot be decoded at all.
#[must_use]
pub fn token_is_stale(token: &str, now: DateTime<Utc>, margin: Duration) -> bool {
    TokenClaims::parse(token).map_or(true, |claims| claims.is_stale_at(now, margin))
}

/// Role claims may be a single string or an array of strings.
fn first_role(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items.iter().find_map(|v| v.as_str().map(String::from)),
        _ => None,
    }
}
