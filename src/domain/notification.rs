//! Notification records and the deduplicating feed that merges REST
//! results with realtime pushes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity attached to a notification by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationSeverity {
    /// Informational.
    #[serde(alias = "info", alias = "INFO")]
    Info,
    /// Positive outcome (e.g. auction won).
    #[serde(alias = "success", alias = "SUCCESS")]
    Success,
    /// Needs attention.
    #[serde(alias = "warning", alias = "WARNING")]
    Warning,
    /// Something failed or is urgent.
    #[serde(alias = "critical", alias = "CRITICAL", alias = "Error", alias = "error")]
    Critical,
    /// A severity this client does not model.
    #[serde(other)]
    Unknown,
}

/// A user notification, identified by `id`.
///
/// The same record can arrive twice: once pushed over the hub and once in a
/// REST listing. [`NotificationFeed`] collapses both into one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Unique notification identifier.
    pub id: uuid::Uuid,
    /// Recipient.
    pub user_id: String,
    /// Server-defined category (e.g. `"BidOutbid"`).
    #[serde(rename = "type")]
    pub notification_type: String,
    /// Severity.
    pub severity: NotificationSeverity,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Whether the user has read it.
    #[serde(default)]
    pub is_read: bool,
    /// When it was read.
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    /// Identifier of the entity the notification is about.
    #[serde(default)]
    pub related_entity_id: Option<String>,
    /// Kind of that entity (e.g. `"Auction"`).
    #[serde(default)]
    pub related_entity_type: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Folds `incoming` into `self`. Content fields take the incoming
    /// values; read state never goes back from read to unread.
    fn absorb(&mut self, incoming: Self) {
        let was_read = self.is_read;
        let read_at = match (self.read_at, incoming.read_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        *self = incoming;
        self.is_read |= was_read;
        self.read_at = read_at;
    }
}

/// Notifications keyed by id, newest first on read-out.
#[derive(Debug, Clone, Default)]
pub struct NotificationFeed {
    records: HashMap<uuid::Uuid, NotificationRecord>,
}

impl NotificationFeed {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or merges one record. Returns `true` if the id was new.
    pub fn upsert(&mut self, record: NotificationRecord) -> bool {
        match self.records.get_mut(&record.id) {
            Some(existing) => {
                existing.absorb(record);
                false
            }
            None => {
                self.records.insert(record.id, record);
                true
            }
        }
    }

    /// Merges a batch (e.g. a REST page). Returns how many ids were new.
    pub fn merge_all(&mut self, records: impl IntoIterator<Item = NotificationRecord>) -> usize {
        records
            .into_iter()
            .map(|r| self.upsert(r))
            .filter(|inserted| *inserted)
            .count()
    }

    /// Marks one record read. Returns `false` if the id is unknown.
    pub fn mark_read(&mut self, id: uuid::Uuid, at: DateTime<Utc>) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        if !record.is_read {
            record.is_read = true;
            record.read_at = Some(at);
        }
        true
    }

    /// Marks every record read. Returns how many changed.
    pub fn mark_all_read(&mut self, at: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for record in self.records.values_mut().filter(|r| !r.is_read) {
            record.is_read = true;
            record.read_at = Some(at);
            changed += 1;
        }
        changed
    }

    /// Removes a record.
    pub fn remove(&mut self, id: uuid::Uuid) -> Option<NotificationRecord> {
        self.records.remove(&id)
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn get(&self, id: uuid::Uuid) -> Option<&NotificationRecord> {
        self.records.get(&id)
    }

    /// Number of unread records.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.records.values().filter(|r| !r.is_read).count()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the feed holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, newest first (ties broken by id for a stable order).
    #[must_use]
    pub fn records(&self) -> Vec<NotificationRecord> {
        let mut out: Vec<_> = self.records.values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        out
    }
}
