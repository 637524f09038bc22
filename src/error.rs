//! Client error taxonomy.
//!
//! [`ClientError`] is the central error type for the crate. Every REST call,
//! token operation and hub connect attempt resolves to one of its variants,
//! so UI-facing code can decide between "show a message" and "force the
//! user back to the login screen" without inspecting strings.
//!
//! | Variant           | Terminal for the session | HTTP equivalent |
//! |-------------------|--------------------------|-----------------|
//! | `Network`         | no (hub retries)         | -               |
//! | `AuthRejected`    | yes                      | 401             |
//! | `SessionExpired`  | yes                      | 401             |
//! | `Unauthenticated` | yes                      | 401             |
//! | `Api`             | no                       | server status   |
//! | `Decode`          | no                       | -               |
//! | `Storage`         | no                       | -               |
//! | `NotConnected`    | no                       | -               |
//! | `Config`          | no                       | -               |

/// Crate-wide error enum.
///
/// `Clone` so that one refresh exchange outcome can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Transient transport failure (DNS, TCP, TLS, timeout, dropped socket).
    #[error("network error: {0}")]
    Network(String),

    /// The server explicitly rejected the presented credentials.
    #[error("credentials rejected by server")]
    AuthRejected,

    /// No valid path to a fresh access token exists.
    #[error("session expired; re-authentication required")]
    SessionExpired,

    /// No access token is stored; the request was not attempted.
    #[error("not authenticated")]
    Unauthenticated,

    /// The server answered with a non-success status or envelope.
    #[error("server error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the server.
        status: u16,
        /// Server-provided message, or the raw body when none was given.
        message: String,
    },

    /// A payload could not be decoded.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// Durable token storage failed.
    #[error("token store error: {0}")]
    Storage(String),

    /// The hub connection is not established.
    #[error("hub not connected")]
    NotConnected,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns `true` when the UI must redirect to the login screen.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::AuthRejected | Self::SessionExpired | Self::Unauthenticated
        )
    }

    /// Returns `true` for failures worth retrying later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Returns the HTTP status this error is equivalent to, if any.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::AuthRejected | Self::SessionExpired | Self::Unauthenticated => Some(401),
            Self::Api { status, .. } => Some(*status),
            Self::Network(_)
            | Self::Decode(_)
            | Self::Storage(_)
            | Self::NotConnected
            | Self::Config(_) => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
