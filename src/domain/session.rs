//! Authenticated session and the flags derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::claims::TokenClaims;

/// The one access/refresh token pair the client holds.
///
/// Owned by the token store; replaced as a whole on refresh and destroyed on
/// logout or terminal refresh failure.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Bearer credential attached to REST calls and the hub handshake.
    pub access_token: String,
    /// Single-use credential exchanged for a new pair.
    pub refresh_token: String,
    /// Expiry decoded from the access token, if it could be decoded.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Builds a session, deriving `expires_at` from the access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let expires_at = TokenClaims::parse(&access_token)
            .ok()
            .map(|c| c.expires_at);
        Self {
            access_token,
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Derives the cached user flags from the access token's claims.
    #[must_use]
    pub fn flags(&self) -> SessionFlags {
        let claims = TokenClaims::parse(&self.access_token).ok();
        SessionFlags {
            user_id: claims.as_ref().and_then(|c| c.subject.clone()),
            email: claims.as_ref().and_then(|c| c.email.clone()),
            role: claims
                .as_ref()
                .and_then(|c| c.role.as_deref())
                .map(UserRole::from_claim),
            expires_at: self.expires_at,
        }
    }
}

// Tokens are credentials; keep them out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Marketplace role carried in the access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRole {
    /// Sells produce and runs auctions.
    Farmer,
    /// Bids on auctions.
    Wholesaler,
    /// Platform administrator.
    Admin,
    /// Any role this client does not model.
    Other(String),
}

impl UserRole {
    /// Maps a role claim, case-insensitively.
    #[must_use]
    pub fn from_claim(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "farmer" => Self::Farmer,
            "wholesaler" => Self::Wholesaler,
            "admin" => Self::Admin,
            _ => Self::Other(raw.to_string()),
        }
    }
}

/// Flags the UI reads to decide which home screen to show.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionFlags {
    /// User identifier from the token subject.
    pub user_id: Option<String>,
    /// E-mail claim.
    pub email: Option<String>,
    /// Marketplace role.
    pub role: Option<UserRole>,
    /// Access token expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::test_support::jwt_with_claims;

    #[test]
    fn new_derives_expiry_and_flags() {
        let access = jwt_with_claims(&serde_json::json!({
            "exp": 1_900_000_000,
            "sub": "u-1",
            "role": "wholesaler",
        }));
        let session = Session::new(access, "r-1");
        assert_eq!(session.expires_at.map(|t| t.timestamp()), Some(1_900_000_000));

        let flags = session.flags();
        assert_eq!(flags.user_id.as_deref(), Some("u-1"));
        assert_eq!(flags.role, Some(UserRole::Wholesaler));
    }

    #[test]
    fn opaque_token_has_no_expiry() {
        let session = Session::new("opaque", "r");
        assert!(session.expires_at.is_none());
        assert_eq!(session.flags(), SessionFlags::default());
    }

    #[test]
    fn debug_redacts_tokens() {
        let session = Session::new("secret-access", "secret-refresh");
        let printed = format!("{session:?}");
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn unknown_role_is_preserved() {
        assert_eq!(
            UserRole::from_claim("Inspector"),
            UserRole::Other("Inspector".to_string())
        );
        assert_eq!(UserRole::from_claim("FARMER"), UserRole::Farmer);
    }
}
