//! Auction group membership.
//!
//! Tracks which auction groups the client intends to be in. The set
//! outlives any single transport: after every (re)connect the connection
//! manager replays it so the server-side membership matches.

use std::collections::BTreeSet;

use super::protocol::{HubFrame, JOIN_AUCTION_GROUP, LEAVE_AUCTION_GROUP};
use super::transport::HubWriter;
use crate::domain::AuctionId;

/// Outcome of replaying the membership onto a fresh link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    /// Join requests sent.
    pub sent: usize,
    /// Join requests that failed to send.
    pub failed: usize,
}

/// The set of auction groups the client belongs to.
#[derive(Debug, Default, Clone)]
pub struct GroupMembership {
    auctions: BTreeSet<AuctionId>,
}

impl GroupMembership {
    /// Creates an empty membership set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id`. Returns `true` if it was not already a member.
    pub fn join(&mut self, id: AuctionId) -> bool {
        self.auctions.insert(id)
    }

    /// Forgets `id`. Returns `true` if it was a member.
    pub fn leave(&mut self, id: AuctionId) -> bool {
        self.auctions.remove(&id)
    }

    /// Forgets every group.
    pub fn clear(&mut self) {
        self.auctions.clear();
    }

    /// Returns `true` if `id` is a member.
    #[must_use]
    pub fn contains(&self, id: AuctionId) -> bool {
        self.auctions.contains(&id)
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.auctions.len()
    }

    /// Returns `true` when no group is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.auctions.is_empty()
    }

    /// Members in ascending id order.
    #[must_use]
    pub fn ids(&self) -> Vec<AuctionId> {
        self.auctions.iter().copied().collect()
    }

    /// Sends one join request per member through `writer`.
    ///
    /// A failed send is logged and counted; the remaining joins are still
    /// attempted.
    pub async fn replay_all(&self, writer: &mut dyn HubWriter) -> ReplayReport {
        let mut report = ReplayReport::default();
        for id in &self.auctions {
            match writer.send(&join_frame(*id)).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(auction_id = %id, error = %e, "group replay failed");
                }
            }
        }
        report
    }
}

/// `JoinAuctionGroup(id)` invocation.
#[must_use]
pub fn join_frame(id: AuctionId) -> HubFrame {
    HubFrame::invoke(JOIN_AUCTION_GROUP, vec![serde_json::Value::String(id.to_string())])
}

/// `LeaveAuctionGroup(id)` invocation.
#[must_use]
pub fn leave_frame(id: AuctionId) -> HubFrame {
    HubFrame::invoke(LEAVE_AUCTION_GROUP, vec![serde_json::Value::String(id.to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingWriter;

    #[test]
    fn join_is_idempotent() {
        let mut groups = GroupMembership::new();
        let id = AuctionId::new();
        assert!(groups.join(id));
        assert!(!groups.join(id));
        assert_eq!(groups.len(), 1);
        assert!(groups.contains(id));
    }

    #[test]
    fn leave_removes_only_that_auction() {
        let mut groups = GroupMembership::new();
        let a = AuctionId::new();
        let b = AuctionId::new();
        groups.join(a);
        groups.join(b);
        assert!(groups.leave(a));
        assert!(!groups.leave(a));
        assert_eq!(groups.ids(), vec![b]);
    }

    #[tokio::test]
    async fn replay_sends_one_join_per_member() {
        let mut groups = GroupMembership::new();
        let a = AuctionId::new();
        let b = AuctionId::new();
        groups.join(a);
        groups.join(b);

        let mut writer = RecordingWriter::default();
        let report = groups.replay_all(&mut writer).await;
        assert_eq!(report, ReplayReport { sent: 2, failed: 0 });

        let mut expected = vec![join_frame(a), join_frame(b)];
        let mut sent = writer.frames();
        expected.sort_by_key(|f| format!("{f:?}"));
        sent.sort_by_key(|f| format!("{f:?}"));
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn replay_continues_past_failures() {
        let mut groups = GroupMembership::new();
        groups.join(AuctionId::new());
        groups.join(AuctionId::new());

        let mut writer = RecordingWriter::failing();
        let report = groups.replay_all(&mut writer).await;
        assert_eq!(report, ReplayReport { sent: 0, failed: 2 });
    }
}
