//! Notification service: REST listing and actions, merged with realtime
//! pushes into one deduplicated feed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use super::authenticated::AuthenticatedClient;
use crate::domain::{EventRegistry, NotificationFeed, NotificationRecord, Subscription};
use crate::error::ClientError;

const NOTIFICATIONS_PATH: &str = "/api/notifications";

/// Keeps the user's notifications in sync from both REST and the hub.
#[derive(Debug, Clone)]
pub struct NotificationService {
    client: AuthenticatedClient,
    feed: Arc<Mutex<NotificationFeed>>,
}

impl NotificationService {
    /// Creates a service with an empty feed.
    #[must_use]
    pub fn new(client: AuthenticatedClient) -> Self {
        Self {
            client,
            feed: Arc::new(Mutex::new(NotificationFeed::new())),
        }
    }

    fn feed(&self) -> MutexGuard<'_, NotificationFeed> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches the listing and merges it into the feed. Returns how many
    /// records were new.
    ///
    /// # Errors
    ///
    /// Propagates [`AuthenticatedClient::get_json`] failures; the feed is
    /// left untouched.
    pub async fn refresh(&self) -> Result<usize, ClientError> {
        let records: Vec<NotificationRecord> = self.client.get_json(NOTIFICATIONS_PATH).await?;
        let fetched = records.len();
        let added = self.feed().merge_all(records);
        tracing::debug!(fetched, added, "notifications refreshed");
        Ok(added)
    }

    /// Marks `id` as read on the server, then locally.
    ///
    /// # Errors
    ///
    /// Propagates [`AuthenticatedClient::put_json`] failures.
    pub async fn mark_read(&self, id: Uuid) -> Result<(), ClientError> {
        self.client
            .put_json(&format!("{NOTIFICATIONS_PATH}/{id}/read"), &serde_json::json!({}))
            .await?;
        self.feed().mark_read(id, Utc::now());
        Ok(())
    }

    /// Deletes `id` on the server, then locally.
    ///
    /// # Errors
    ///
    /// Propagates [`AuthenticatedClient::delete`] failures.
    pub async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        self.client
            .delete(&format!("{NOTIFICATIONS_PATH}/{id}"))
            .await?;
        self.feed().remove(id);
        Ok(())
    }

    /// Feeds realtime notifications from `registry` into this feed.
    pub fn attach(&self, registry: &EventRegistry) -> Subscription {
        let feed = Arc::clone(&self.feed);
        registry.on_notification(move |record| {
            let mut feed = feed.lock().unwrap_or_else(PoisonError::into_inner);
            if !feed.upsert(record.clone()) {
                tracing::debug!(id = %record.id, "pushed notification merged");
            }
        })
    }

    /// Current records, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.feed().records()
    }

    /// Number of unread records.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.feed().unread_count()
    }
}
