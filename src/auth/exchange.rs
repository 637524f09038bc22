//! Client for the token exchange endpoint.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::envelope::ApiEnvelope;
use crate::api::request::{ApiRequest, HttpSend};
use crate::error::ClientError;

/// Header carrying the refresh token, alongside the JSON body.
pub const REFRESH_TOKEN_HEADER: &str = "X-Refresh-Token";

/// Tokens issued by the server on login or refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// New access token.
    pub access_token: String,
    /// New (rotated) refresh token.
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}

/// Exchanges a refresh token for a new pair.
#[async_trait]
pub trait TokenExchange: Send + Sync + fmt::Debug {
    /// Performs one exchange. Implementations must not retry.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AuthRejected`] if the server refused the token.
    /// - [`ClientError::Network`] on transport failure.
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, ClientError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// [`TokenExchange`] over the REST refresh endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    sender: Arc<dyn HttpSend>,
    path: String,
}

impl HttpTokenExchange {
    /// Creates an exchange that posts to `path` through `sender`.
    #[must_use]
    pub fn new(sender: Arc<dyn HttpSend>, path: impl Into<String>) -> Self {
        Self {
            sender,
            path: path.into(),
        }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        let request = ApiRequest::post(&self.path, &RefreshBody { refresh_token })?
            .with_header(REFRESH_TOKEN_HEADER, refresh_token);
        let response = self.sender.send(&request, None).await?;

        if !response.is_success() {
            tracing::warn!(status = response.status, "refresh exchange rejected");
            return Err(ClientError::AuthRejected);
        }
        let Ok(envelope) = response.json::<ApiEnvelope<TokenPair>>() else {
            tracing::warn!("refresh exchange returned an unreadable body");
            return Err(ClientError::AuthRejected);
        };
        match envelope.data {
            Some(pair) if envelope.is_success => Ok(pair),
            _ => {
                tracing::warn!(message = ?envelope.message, "refresh exchange unsuccessful");
                Err(ClientError::AuthRejected)
            }
        }
    }
}
