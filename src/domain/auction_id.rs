//! Type-safe auction identifier.
//!
//! [`AuctionId`] is a newtype wrapper around [`uuid::Uuid`] so auction room
//! identifiers cannot be confused with notification or user identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of an auction, and of the hub group that carries its events.
///
/// Used as the key of the group membership set and as the argument of the
/// `JoinAuctionGroup` / `LeaveAuctionGroup` hub invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuctionId(uuid::Uuid);

impl AuctionId {
    /// Creates a new random `AuctionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates an `AuctionId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for AuctionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AuctionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<uuid::Uuid>().map(Self)
    }
}

impl From<uuid::Uuid> for AuctionId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}
