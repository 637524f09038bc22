//! The `{ isSuccess, data, message }` envelope every endpoint answers with.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::request::ApiResponse;
use crate::error::ClientError;

/// Response envelope used by the marketplace API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    /// Whether the operation succeeded.
    pub is_success: bool,
    /// Payload on success.
    pub data: Option<T>,
    /// Human-readable message, usually set on failure.
    #[serde(default)]
    pub message: Option<String>,
    /// Validation errors, when the server lists them.
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

impl<T> ApiEnvelope<T> {
    /// Best message for a failed envelope.
    fn failure_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.errors.as_ref().map(|e| e.join("; ")))
            .unwrap_or_else(|| "request was not successful".to_string())
    }
}

/// Decodes the `data` of a successful response.
///
/// # Errors
///
/// - [`ClientError::Api`] for non-2xx statuses or `isSuccess: false`.
/// - [`ClientError::Decode`] if the body is not an envelope or `data` is
///   missing.
pub fn decode_data<T: DeserializeOwned>(response: &ApiResponse) -> Result<T, ClientError> {
    let envelope = decode_envelope::<T>(response)?;
    envelope
        .data
        .ok_or_else(|| ClientError::Decode("envelope has no data".to_string()))
}

/// Checks a response whose payload the caller does not need.
///
/// # Errors
///
/// Returns [`ClientError::Api`] for non-2xx statuses or `isSuccess: false`.
pub fn expect_success(response: &ApiResponse) -> Result<(), ClientError> {
    if response.body.trim().is_empty() && response.is_success() {
        return Ok(());
    }
    decode_envelope::<serde_json::Value>(response).map(|_| ())
}

fn decode_envelope<T: DeserializeOwned>(
    response: &ApiResponse,
) -> Result<ApiEnvelope<T>, ClientError> {
    if !response.is_success() {
        let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&response.body)
            .map(|e| e.failure_message())
            .unwrap_or_else(|_| response.body.clone());
        return Err(ClientError::Api {
            status: response.status,
            message,
        });
    }

    let envelope: ApiEnvelope<T> = response.json()?;
    if !envelope.is_success {
        return Err(ClientError::Api {
            status: response.status,
            message: envelope.failure_message(),
        });
    }
    Ok(envelope)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decodes_success_payload() {
        let resp = ApiResponse::new(200, r#"{"isSuccess":true,"data":[1,2,3]}"#);
        let Ok(data) = decode_data::<Vec<u32>>(&resp) else {
            panic!("should decode");
        };
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn is_success_false_is_api_error() {
        let resp = ApiResponse::new(200, r#"{"isSuccess":false,"message":"Auction closed"}"#);
        assert_eq!(
            decode_data::<serde_json::Value>(&resp),
            Err(ClientError::Api {
                status: 200,
                message: "Auction closed".to_string()
            })
        );
    }

    #[test]
    fn non_2xx_uses_envelope_errors_or_body() {
        let resp = ApiResponse::new(400, r#"{"isSuccess":false,"errors":["amount","price"]}"#);
        assert_eq!(
            expect_success(&resp),
            Err(ClientError::Api {
                status: 400,
                message: "amount; price".to_string()
            })
        );
        let raw = ApiResponse::new(502, "Bad Gateway");
        assert_eq!(
            expect_success(&raw),
            Err(ClientError::Api {
                status: 502,
                message: "Bad Gateway".to_string()
            })
        );
    }

    #[test]
    fn missing_data_is_decode_error() {
        let resp = ApiResponse::new(200, r#"{"isSuccess":true}"#);
        assert!(matches!(
            decode_data::<u32>(&resp),
            Err(ClientError::Decode(_))
        ));
        assert_eq!(expect_success(&resp), Ok(()));
        assert_eq!(expect_success(&ApiResponse::new(204, "")), Ok(()));
    }
}
