//! REST layer: request model, response envelope, the authenticated
//! wrapper and the notification service built on it.
//!
//! Paths are relative to [`ClientConfig::api_base_url`](crate::config::ClientConfig::api_base_url).

pub mod authenticated;
pub mod envelope;
pub mod notifications;
pub mod request;

pub use authenticated::AuthenticatedClient;
pub use envelope::ApiEnvelope;
pub use notifications::NotificationService;
pub use request::{ApiRequest, ApiResponse, HttpSend, ReqwestSender};
