//! Bearer-authenticated REST calls with one refresh-and-retry on 401.
//!
//! Every request first obtains a fresh access token from the
//! [`RefreshCoordinator`]. A 401 triggers exactly one refresh and one
//! resend; a second 401 terminates the session.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::envelope::{decode_data, expect_success};
use super::request::{ApiRequest, ApiResponse, HttpSend};
use crate::auth::{RefreshCoordinator, TokenPair};
use crate::domain::{Session, SessionFlags};
use crate::error::ClientError;

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

/// REST client that attaches and maintains the session's bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    sender: Arc<dyn HttpSend>,
    tokens: RefreshCoordinator,
    login_path: String,
}

impl AuthenticatedClient {
    /// Creates a client sending through `sender`.
    #[must_use]
    pub fn new(
        sender: Arc<dyn HttpSend>,
        tokens: RefreshCoordinator,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            tokens,
            login_path: login_path.into(),
        }
    }

    /// The coordinator guarding this client's tokens.
    #[must_use]
    pub fn tokens(&self) -> &RefreshCoordinator {
        &self.tokens
    }

    /// Sends `request` with the current bearer token.
    ///
    /// Non-2xx statuses other than 401 are returned as responses.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Unauthenticated`] if there is no session; nothing
    ///   is sent.
    /// - [`ClientError::SessionExpired`] if a needed refresh failed.
    /// - [`ClientError::AuthRejected`] if the request was rejected again
    ///   after a refresh; the session has been cleared.
    /// - [`ClientError::Network`] on transport failure.
    pub async fn request(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        if self.tokens.store().access_token().await?.is_none() {
            tracing::debug!(path = %request.path, "no session; request not sent");
            return Err(ClientError::Unauthenticated);
        }

        let token = self.tokens.ensure_fresh_access_token().await?;
        let response = self.sender.send(request, Some(&token)).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::info!(path = %request.path, "bearer token rejected; refreshing once");
        let token = self.tokens.refresh_after_rejection(&token).await?;
        let retried = self.sender.send(request, Some(&token)).await?;
        if !retried.is_unauthorized() {
            return Ok(retried);
        }

        tracing::warn!(path = %request.path, "bearer token rejected after refresh");
        if let Err(e) = self.tokens.invalidate().await {
            tracing::warn!(error = %e, "could not clear session");
        }
        Err(ClientError::AuthRejected)
    }

    /// `GET path`, decoding the envelope's data.
    ///
    /// # Errors
    ///
    /// Everything [`request`](Self::request) returns, plus
    /// [`ClientError::Api`] and [`ClientError::Decode`] from the envelope.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.request(&ApiRequest::get(path)).await?;
        decode_data(&response)
    }

    /// `POST path` with a JSON body, decoding the envelope's data.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self.request(&ApiRequest::post(path, body)?).await?;
        decode_data(&response)
    }

    /// `PUT path` with a JSON body, ignoring the payload.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn put_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), ClientError> {
        let response = self.request(&ApiRequest::put(path, body)?).await?;
        expect_success(&response)
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let response = self.request(&ApiRequest::delete(path)).await?;
        expect_success(&response)
    }

    /// Signs in with credentials and stores the issued pair.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Api`] if the credentials were refused.
    /// - [`ClientError::Network`], [`ClientError::Decode`] or
    ///   [`ClientError::Storage`] otherwise.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionFlags, ClientError> {
        let request = ApiRequest::post(&self.login_path, &LoginBody { email, password })?;
        let response = self.sender.send(&request, None).await?;
        let pair: TokenPair = decode_data(&response)?;
        self.tokens
            .store()
            .set_session(&pair.access_token, &pair.refresh_token)
            .await?;
        let flags = Session::new(pair.access_token, pair.refresh_token).flags();
        tracing::info!(user_id = ?flags.user_id, role = ?flags.role, "signed in");
        Ok(flags)
    }

    /// Forgets the session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the store cannot be cleared.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.tokens.invalidate().await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, TokenStore};
    use crate::domain::UserRole;
    use crate::test_support::{
        FixedClock, ScriptedExchange, ScriptedSender, jwt_expiring_in, jwt_with_claims,
    };
    use std::time::Duration;

    const OK_BODY: &str = r#"{"isSuccess":true,"data":{"n":1}}"#;

    fn client(
        store: &Arc<MemoryTokenStore>,
        exchange: &Arc<ScriptedExchange>,
        sender: &Arc<ScriptedSender>,
    ) -> AuthenticatedClient {
        let tokens = RefreshCoordinator::new(
            Arc::clone(store) as Arc<dyn TokenStore>,
            Arc::clone(exchange) as Arc<dyn crate::auth::TokenExchange>,
            Arc::new(FixedClock::current()),
            Duration::from_secs(120),
        );
        AuthenticatedClient::new(
            Arc::clone(sender) as Arc<dyn HttpSend>,
            tokens,
            "/api/auth/login",
        )
    }

    #[tokio::test]
    async fn unauthorized_is_retried_exactly_once() {
        let first = jwt_expiring_in(600);
        let store = Arc::new(MemoryTokenStore::with_session(Session::new(first.clone(), "r1")));
        let exchange = Arc::new(ScriptedExchange::succeeding());
        let sender = Arc::new(ScriptedSender::new(vec![
            Ok(ApiResponse::new(401, "")),
            Ok(ApiResponse::new(200, OK_BODY)),
        ]));
        let client = client(&store, &exchange, &sender);

        let Ok(value) = client.get_json::<serde_json::Value>("/api/auctions").await else {
            panic!("retry should succeed");
        };
        assert_eq!(value, serde_json::json!({ "n": 1 }));
        assert_eq!(exchange.calls(), 1);

        let bearers = sender.bearers();
        assert_eq!(bearers.len(), 2);
        assert_eq!(bearers.first(), Some(&Some(first.clone())));
        assert_ne!(bearers.get(1), Some(&Some(first)));
    }

    #[tokio::test]
    async fn second_unauthorized_clears_session_without_third_attempt() {
        let store = Arc::new(MemoryTokenStore::with_session(Session::new(
            jwt_expiring_in(600),
            "r1",
        )));
        let exchange = Arc::new(ScriptedExchange::succeeding());
        let sender = Arc::new(ScriptedSender::new(vec![
            Ok(ApiResponse::new(401, "")),
            Ok(ApiResponse::new(401, "")),
            Ok(ApiResponse::new(200, OK_BODY)),
        ]));
        let client = client(&store, &exchange, &sender);

        let result = client.get_json::<serde_json::Value>("/api/auctions").await;
        assert_eq!(result, Err(ClientError::AuthRejected));
        assert_eq!(sender.sent().len(), 2);
        assert_eq!(store.access_token().await, Ok(None));
    }

    #[tokio::test]
    async fn missing_session_fails_without_sending() {
        let store = Arc::new(MemoryTokenStore::new());
        let exchange = Arc::new(ScriptedExchange::succeeding());
        let sender = Arc::new(ScriptedSender::new(Vec::new()));
        let client = client(&store, &exchange, &sender);

        assert_eq!(
            client.delete("/api/notifications/1").await,
            Err(ClientError::Unauthenticated)
        );
        assert!(sender.sent().is_empty());
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn stale_token_is_refreshed_before_sending() {
        let store = Arc::new(MemoryTokenStore::with_session(Session::new(
            jwt_expiring_in(30),
            "r1",
        )));
        let exchange = Arc::new(ScriptedExchange::succeeding());
        let sender = Arc::new(ScriptedSender::new(vec![Ok(ApiResponse::new(200, OK_BODY))]));
        let client = client(&store, &exchange, &sender);

        assert!(client.get_json::<serde_json::Value>("/api/auctions").await.is_ok());
        assert_eq!(exchange.calls(), 1);
        let Ok(Some(current)) = store.access_token().await else {
            panic!("refreshed token should be stored");
        };
        assert_eq!(sender.bearers(), vec![Some(current)]);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let store = Arc::new(MemoryTokenStore::with_session(Session::new(
            jwt_expiring_in(600),
            "r1",
        )));
        let exchange = Arc::new(ScriptedExchange::succeeding());
        let sender = Arc::new(ScriptedSender::new(vec![Ok(ApiResponse::new(
            500,
            r#"{"isSuccess":false,"message":"boom"}"#,
        ))]));
        let client = client(&store, &exchange, &sender);

        assert_eq!(
            client.get_json::<serde_json::Value>("/api/auctions").await,
            Err(ClientError::Api {
                status: 500,
                message: "boom".to_string()
            })
        );
        assert_eq!(sender.sent().len(), 1);
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn login_stores_pair_and_returns_flags() {
        let access = jwt_with_claims(&serde_json::json!({
            "exp": chrono::Utc::now().timestamp() + 3600,
            "sub": "farmer-7",
            "role": "Farmer",
        }));
        let body = serde_json::json!({
            "isSuccess": true,
            "data": { "accessToken": access, "refreshToken": "r9" }
        });
        let store = Arc::new(MemoryTokenStore::new());
        let exchange = Arc::new(ScriptedExchange::succeeding());
        let sender = Arc::new(ScriptedSender::new(vec![Ok(ApiResponse::new(
            200,
            body.to_string(),
        ))]));
        let client = client(&store, &exchange, &sender);

        let Ok(flags) = client.login("farmer@example.com", "secret").await else {
            panic!("login should succeed");
        };
        assert_eq!(flags.user_id.as_deref(), Some("farmer-7"));
        assert_eq!(flags.role, Some(UserRole::Farmer));
        assert_eq!(store.refresh_token().await, Ok(Some("r9".to_string())));
        assert_eq!(sender.bearers(), vec![None]);

        tokio_test::assert_ok!(client.logout().await);
        assert_eq!(store.load().await, Ok(None));
    }
}
