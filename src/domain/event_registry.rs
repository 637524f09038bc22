//! Typed publish/subscribe registry for hub events.
//!
//! [`EventRegistry`] keeps, per [`EventKind`], an ordered list of handlers.
//! The connection manager calls [`EventRegistry::dispatch`] for every
//! inbound event; the registry never knows who its consumers are.
//!
//! Dispatch is synchronous and runs over a snapshot of the handler list, so
//! handlers may subscribe or unsubscribe while an event is being delivered.
//! A handler that returns an error or panics is logged and skipped; the
//! remaining handlers still receive the event.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::hub_event::{BidPlaced, BuyNowExecuted, ConnectionState, EventKind, HubEvent, SystemNotice};
use super::notification::NotificationRecord;

/// Failure reported by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event handler failed: {0}")]
pub struct HandlerError(pub String);

type Handler = Arc<dyn Fn(&HubEvent) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Default)]
struct Slots {
    by_kind: HashMap<EventKind, Vec<(u64, Handler)>>,
}

struct Shared {
    slots: RwLock<Slots>,
    next_id: AtomicU64,
}

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Handlers that completed successfully.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Fan-out registry shared by the connection manager and UI surfaces.
///
/// Cloning is cheap; all clones share the same subscriptions.
#[derive(Clone)]
pub struct EventRegistry {
    shared: Arc<Shared>,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    /// Creates a registry with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: RwLock::new(Slots::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a fallible handler for `kind`.
    ///
    /// The handler stays registered until [`Subscription::unsubscribe`] is
    /// called on the returned handle.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&HubEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_kind
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.shared),
            kind,
            id,
        }
    }

    /// Subscribes to bids on any joined auction.
    pub fn on_bid_placed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BidPlaced) + Send + Sync + 'static,
    {
        self.on(EventKind::BidPlaced, move |event| {
            if let HubEvent::BidPlaced(bid) = event {
                handler(bid);
            }
            Ok(())
        })
    }

    /// Subscribes to buy-now executions.
    pub fn on_buy_now_executed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BuyNowExecuted) + Send + Sync + 'static,
    {
        self.on(EventKind::BuyNowExecuted, move |event| {
            if let HubEvent::BuyNowExecuted(purchase) = event {
                handler(purchase);
            }
            Ok(())
        })
    }

    /// Subscribes to pushed notifications.
    pub fn on_notification<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&NotificationRecord) + Send + Sync + 'static,
    {
        self.on(EventKind::NewNotification, move |event| {
            if let HubEvent::NewNotification(record) = event {
                handler(record);
            }
            Ok(())
        })
    }

    /// Subscribes to system notices.
    pub fn on_system_notice<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SystemNotice) + Send + Sync + 'static,
    {
        self.on(EventKind::SystemNotice, move |event| {
            if let HubEvent::SystemNotice(notice) = event {
                handler(notice);
            }
            Ok(())
        })
    }

    /// Subscribes to connection-state transitions.
    pub fn on_connection_state<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.on(EventKind::ConnectionStateChanged, move |event| {
            if let HubEvent::ConnectionStateChanged(state) = event {
                handler(*state);
            }
            Ok(())
        })
    }

    /// Delivers `event` to every handler currently registered for its kind,
    /// in subscription order.
    pub fn dispatch(&self, event: &HubEvent) -> DispatchReport {
        let kind = event.kind();
        let snapshot: Vec<Handler> = {
            let slots = self
                .shared
                .slots
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            slots
                .by_kind
                .get(&kind)
                .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        let mut report = DispatchReport::default();
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    tracing::warn!(?kind, error = %err, "event handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(?kind, "event handler panicked");
                }
            }
        }
        report
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.shared
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_kind
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_kind
            .values()
            .map(Vec::len)
            .sum()
    }
}

/// Handle returned by every `on*` call.
///
/// Dropping it leaves the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "keep the handle to be able to unsubscribe"]
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Shared>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// The event kind this subscription listens to.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Removes the handler. Returns `false` if it was already gone (or the
    /// registry was dropped).
    pub fn unsubscribe(self) -> bool {
        let Some(shared) = self.registry.upgrade() else {
            return false;
        };
        let mut slots = shared.slots.write().unwrap_or_else(PoisonError::into_inner);
        let Some(handlers) = slots.by_kind.get_mut(&self.kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != self.id);
        before != handlers.len()
    }
}
