//! Events delivered to subscribers of the realtime hub.
//!
//! Server pushes arrive as named invocations with positional JSON
//! arguments; [`HubEvent::from_invocation`] turns them into typed variants.
//! Connection-state changes are published through the same type so one
//! registry serves every UI surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuctionId;
use super::notification::NotificationRecord;
use crate::error::ClientError;

/// Lifecycle state of the hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport, no pending attempt.
    Disconnected,
    /// First attempt in progress.
    Connecting,
    /// Transport open and group membership restored.
    Connected,
    /// Transport lost; automatic attempts in progress.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` only for [`ConnectionState::Connected`].
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` while an attempt is pending.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

/// A bid was accepted on an auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidPlaced {
    /// Auction the bid belongs to.
    pub auction_id: AuctionId,
    /// Bid identifier.
    #[serde(default)]
    pub bid_id: Option<uuid::Uuid>,
    /// Bidder identifier.
    #[serde(default)]
    pub bidder_id: Option<String>,
    /// Bidder display name.
    #[serde(default)]
    pub bidder_name: Option<String>,
    /// Bid amount.
    pub amount: f64,
    /// Auction price after the bid.
    #[serde(default)]
    pub current_price: Option<f64>,
    /// Number of bids on the auction after this one.
    #[serde(default)]
    pub total_bids: Option<u32>,
    /// When the server accepted the bid.
    #[serde(default)]
    pub placed_at: Option<DateTime<Utc>>,
}

/// An auction was closed by a buy-now purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyNowExecuted {
    /// Auction that was bought out.
    pub auction_id: AuctionId,
    /// Buyer identifier.
    #[serde(default)]
    pub buyer_id: Option<String>,
    /// Buyer display name.
    #[serde(default)]
    pub buyer_name: Option<String>,
    /// Price paid.
    pub price: f64,
    /// When the purchase executed.
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
}

/// A platform-wide notice (maintenance, announcements).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemNotice {
    /// Optional headline.
    #[serde(default)]
    pub title: Option<String>,
    /// Notice text.
    pub message: String,
    /// Optional severity label.
    #[serde(default)]
    pub severity: Option<String>,
}

/// Discriminant of [`HubEvent`], used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`HubEvent::BidPlaced`].
    BidPlaced,
    /// [`HubEvent::BuyNowExecuted`].
    BuyNowExecuted,
    /// [`HubEvent::NewNotification`].
    NewNotification,
    /// [`HubEvent::SystemNotice`].
    SystemNotice,
    /// [`HubEvent::ConnectionStateChanged`].
    ConnectionStateChanged,
}

/// Every event a subscriber can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// A bid was placed.
    BidPlaced(BidPlaced),
    /// A buy-now purchase closed an auction.
    BuyNowExecuted(BuyNowExecuted),
    /// A notification was pushed to this user.
    NewNotification(NotificationRecord),
    /// A platform notice was broadcast.
    SystemNotice(SystemNotice),
    /// The hub connection changed state.
    ConnectionStateChanged(ConnectionState),
}

impl HubEvent {
    /// Returns the registry key for this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::BidPlaced(_) => EventKind::BidPlaced,
            Self::BuyNowExecuted(_) => EventKind::BuyNowExecuted,
            Self::NewNotification(_) => EventKind::NewNotification,
            Self::SystemNotice(_) => EventKind::SystemNotice,
            Self::ConnectionStateChanged(_) => EventKind::ConnectionStateChanged,
        }
    }

    /// Returns the auction this event is scoped to, if any.
    #[must_use]
    pub const fn auction_id(&self) -> Option<AuctionId> {
        match self {
            Self::BidPlaced(e) => Some(e.auction_id),
            Self::BuyNowExecuted(e) => Some(e.auction_id),
            Self::NewNotification(_) | Self::SystemNotice(_) | Self::ConnectionStateChanged(_) => {
                None
            }
        }
    }

    /// Decodes a server invocation.
    ///
    /// Returns `Ok(None)` for targets this client does not handle.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if a known target carries an
    /// argument that does not match its payload shape.
    pub fn from_invocation(
        target: &str,
        arguments: &[serde_json::Value],
    ) -> Result<Option<Self>, ClientError> {
        let event = match target {
            "BidPlaced" => Self::BidPlaced(first_argument(target, arguments)?),
            "BuyNowExecuted" => Self::BuyNowExecuted(first_argument(target, arguments)?),
            "ReceiveNotification" | "NewNotification" => {
                Self::NewNotification(first_argument(target, arguments)?)
            }
            "SystemNotice" => Self::SystemNotice(system_notice(arguments)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn first_argument<T: serde::de::DeserializeOwned>(
    target: &str,
    arguments: &[serde_json::Value],
) -> Result<T, ClientError> {
    let value = arguments
        .first()
        .ok_or_else(|| ClientError::Decode(format!("{target}: missing argument")))?;
    T::deserialize(value).map_err(|e| ClientError::Decode(format!("{target}: {e}")))
}

/// Notices are sent either as an object or as a bare string.
fn system_notice(arguments: &[serde_json::Value]) -> Result<SystemNotice, ClientError> {
    match arguments.first() {
        Some(serde_json::Value::String(message)) => Ok(SystemNotice {
            title: None,
            message: message.clone(),
            severity: None,
        }),
        _ => first_argument("SystemNotice", arguments),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bid_placed() {
        let auction = AuctionId::new();
        let args = vec![serde_json::json!({
            "auctionId": auction.to_string(),
            "bidderName": "Green Valley Co",
            "amount": 1250.5,
            "currentPrice": 1250.5,
            "totalBids": 4
        })];
        let Ok(Some(event)) = HubEvent::from_invocation("BidPlaced", &args) else {
            panic!("bid should decode");
        };
        assert_eq!(event.kind(), EventKind::BidPlaced);
        assert_eq!(event.auction_id(), Some(auction));
    }

    #[test]
    fn unknown_target_is_ignored() {
        let result = HubEvent::from_invocation("AuctionViewerCount", &[serde_json::json!(3)]);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn bad_payload_is_decode_error() {
        let result = HubEvent::from_invocation("BuyNowExecuted", &[serde_json::json!("oops")]);
        assert!(matches!(result, Err(ClientError::Decode(_))));
        let missing = HubEvent::from_invocation("BidPlaced", &[]);
        assert!(matches!(missing, Err(ClientError::Decode(_))));
    }

    #[test]
    fn system_notice_accepts_bare_string() {
        let Ok(Some(HubEvent::SystemNotice(notice))) =
            HubEvent::from_invocation("SystemNotice", &[serde_json::json!("Maintenance at 02:00")])
        else {
            panic!("notice should decode");
        };
        assert_eq!(notice.message, "Maintenance at 02:00");
    }

    #[test]
    fn connection_state_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Reconnecting.is_pending());
        assert!(!ConnectionState::Disconnected.is_pending());
    }
}
