//! HTTP request/response model and the sender seam.
//!
//! Requests are plain data so the authenticated wrapper can reissue the same
//! request after a refresh. [`HttpSend`] is the only place that touches the
//! network; [`ReqwestSender`] is the production implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ClientError;

/// A REST request relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base (e.g. `/api/notifications`).
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Creates a request without query, headers or body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// `GET path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `DELETE path`.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if `body` cannot be serialized.
    pub fn post<B: Serialize>(path: impl Into<String>, body: &B) -> Result<Self, ClientError> {
        Self::new(Method::POST, path).with_json(body)
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if `body` cannot be serialized.
    pub fn put<B: Serialize>(path: impl Into<String>, body: &B) -> Result<Self, ClientError> {
        Self::new(Method::PUT, path).with_json(body)
    }

    /// Replaces the body with `body` serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if `body` cannot be serialized.
    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status and raw body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl ApiResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns `true` for 401.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Network seam: sends one request, optionally with a bearer token.
#[async_trait]
pub trait HttpSend: Send + Sync + fmt::Debug {
    /// Sends `request`. Non-2xx statuses are returned as responses, not
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] on transport failure.
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>)
    -> Result<ApiResponse, ClientError>;
}

/// [`HttpSend`] implementation over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestSender {
    /// Creates a sender rooted at `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] if the HTTP client cannot be built
    /// (e.g. TLS backend initialisation failure).
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Resolves `path` below the base URL, keeping any base path prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the joined URL is invalid.
    pub fn url_for(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Config(format!("invalid path {path}: {e}")))
    }
}

#[async_trait]
impl HttpSend for ReqwestSender {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.url_for(&request.path)?;

        let mut builder = self.client.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!(method = %request.method, path = %request.path, status, "http request completed");
        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn builders_compose() {
        let Ok(req) = ApiRequest::post("/api/bids", &serde_json::json!({ "amount": 10 })) else {
            panic!("serializable body");
        };
        let req = req.with_query("page", 2).with_header("X-Trace", "t-1");
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(req.headers.len(), 1);
        assert!(req.body.is_some());
    }

    #[test]
    fn response_predicates() {
        assert!(ApiResponse::new(204, "").is_success());
        assert!(ApiResponse::new(401, "").is_unauthorized());
        assert!(!ApiResponse::new(500, "").is_success());
    }

    #[test]
    fn response_json_decodes() {
        let resp = ApiResponse::new(200, r#"{"n":3}"#);
        let Ok(value) = resp.json::<serde_json::Value>() else {
            panic!("valid json");
        };
        assert_eq!(value.get("n").and_then(serde_json::Value::as_i64), Some(3));
        assert!(matches!(
            ApiResponse::new(200, "<html>").json::<serde_json::Value>(),
            Err(ClientError::Decode(_))
        ));
    }

    #[test]
    fn url_for_keeps_base_path_prefix() {
        let Ok(base) = Url::parse("https://market.example.com/v2/") else {
            panic!("valid base url");
        };
        let Ok(sender) = ReqwestSender::new(base, Duration::from_secs(5)) else {
            panic!("client builds");
        };
        let Ok(url) = sender.url_for("/api/notifications") else {
            panic!("valid path");
        };
        assert_eq!(url.as_str(), "https://market.example.com/v2/api/notifications");
    }
}
