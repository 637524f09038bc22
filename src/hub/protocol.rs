//! Hub wire format: JSON frames terminated by the ASCII record separator.
//!
//! A session starts with a handshake request from the client and an empty
//! handshake response (`{}`) from the server. After that, every frame is a
//! JSON object with a numeric `type`:
//!
//! | type | frame        | direction        |
//! |------|--------------|------------------|
//! | 1    | invocation   | both             |
//! | 3    | completion   | server → client  |
//! | 6    | ping         | both             |
//! | 7    | close        | server → client  |
//!
//! Other frame types are decoded as [`HubFrame::Other`] and ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// Frame terminator.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Client method that adds the caller to an auction's group.
pub const JOIN_AUCTION_GROUP: &str = "JoinAuctionGroup";
/// Client method that removes the caller from an auction's group.
pub const LEAVE_AUCTION_GROUP: &str = "LeaveAuctionGroup";
/// Client method that deletes a notification.
pub const DELETE_NOTIFICATION: &str = "DeleteNotification";

const INVOCATION: u8 = 1;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

/// Handshake request sent right after the socket opens.
#[must_use]
pub fn handshake_request() -> String {
    format!(r#"{{"protocol":"json","version":1}}{RECORD_SEPARATOR}"#)
}

/// One decoded hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    /// Method call: server push or client request.
    Invocation {
        /// Method name.
        target: String,
        /// Positional arguments.
        arguments: Vec<Value>,
        /// Present when the sender expects a completion.
        invocation_id: Option<String>,
    },
    /// Result of a client invocation.
    Completion {
        /// Id of the invocation being completed.
        invocation_id: String,
        /// Error text, if the call failed.
        error: Option<String>,
    },
    /// Keep-alive.
    Ping,
    /// Server is closing the connection.
    Close {
        /// Reason given by the server.
        error: Option<String>,
        /// `false` means the server asks the client not to reconnect.
        allow_reconnect: bool,
    },
    /// Any frame type this client does not act on.
    Other(u8),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

impl HubFrame {
    /// Invocation without an id: the server sends no completion.
    #[must_use]
    pub fn invoke(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self::Invocation {
            target: target.into(),
            arguments,
            invocation_id: None,
        }
    }

    /// Encodes the frame including its trailing separator.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] for [`HubFrame::Other`], which has no
    /// wire form of its own.
    pub fn encode(&self) -> Result<String, ClientError> {
        let raw = match self {
            Self::Invocation {
                target,
                arguments,
                invocation_id,
            } => RawFrame {
                frame_type: INVOCATION,
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                invocation_id: invocation_id.clone(),
                error: None,
                allow_reconnect: None,
            },
            Self::Completion {
                invocation_id,
                error,
            } => RawFrame {
                frame_type: COMPLETION,
                target: None,
                arguments: None,
                invocation_id: Some(invocation_id.clone()),
                error: error.clone(),
                allow_reconnect: None,
            },
            Self::Ping => RawFrame {
                frame_type: PING,
                target: None,
                arguments: None,
                invocation_id: None,
                error: None,
                allow_reconnect: None,
            },
            Self::Close {
                error,
                allow_reconnect,
            } => RawFrame {
                frame_type: CLOSE,
                target: None,
                arguments: None,
                invocation_id: None,
                error: error.clone(),
                allow_reconnect: Some(*allow_reconnect),
            },
            Self::Other(t) => {
                return Err(ClientError::Decode(format!("cannot encode frame type {t}")));
            }
        };
        let mut text = serde_json::to_string(&raw)?;
        text.push(RECORD_SEPARATOR);
        Ok(text)
    }

    /// Decodes a single frame (without its separator).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] for malformed JSON or an invocation
    /// without a target.
    pub fn decode(text: &str) -> Result<Self, ClientError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let frame = match raw.frame_type {
            INVOCATION => Self::Invocation {
                target: raw
                    .target
                    .ok_or_else(|| ClientError::Decode("invocation without target".to_string()))?,
                arguments: raw.arguments.unwrap_or_default(),
                invocation_id: raw.invocation_id,
            },
            COMPLETION => Self::Completion {
                invocation_id: raw.invocation_id.unwrap_or_default(),
                error: raw.error,
            },
            PING => Self::Ping,
            CLOSE => Self::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect.unwrap_or(false),
            },
            other => Self::Other(other),
        };
        Ok(frame)
    }
}

/// Splits a text message into its frames, skipping empty segments.
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR).filter(|s| !s.trim().is_empty())
}

/// Checks the server's handshake response.
///
/// # Errors
///
/// Returns [`ClientError::Network`] if the server reported a handshake
/// error, or [`ClientError::Decode`] if the response is not JSON.
pub fn check_handshake_response(text: &str) -> Result<(), ClientError> {
    let value: Value = serde_json::from_str(text)?;
    match value.get("error").and_then(Value::as_str) {
        Some(error) => Err(ClientError::Network(format!("hub handshake failed: {error}"))),
        None => Ok(()),
    }
}
