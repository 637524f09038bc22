//! Realtime hub connection state machine.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──open ok──▶ Connected
//!      ▲                          │                     │
//!      │                   network failure          link dropped
//!      │                          ▼                     ▼
//!      └──attempts exhausted── Reconnecting ◀───────────┘
//!                                 │
//!                                 └──open ok (after group replay)──▶ Connected
//! ```
//!
//! `disconnect()` moves any state to `Disconnected`. So does the end of
//! the session, whether the hub rejects the token or the
//! [`RefreshCoordinator`] announces that the session ended elsewhere;
//! group membership is forgotten with it. Every transition is
//! published on a `watch` channel and as a
//! [`HubEvent::ConnectionStateChanged`] through the [`EventRegistry`].
//!
//! One supervisor task per live connection reads frames, dispatches
//! events in arrival order, sends keep-alive pings and runs the reconnect
//! loop. A generation counter, bumped by every `connect()` and
//! `disconnect()`, retires supervisors belonging to an older lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::groups::{GroupMembership, join_frame, leave_frame};
use super::protocol::{DELETE_NOTIFICATION, HubFrame};
use super::retry::RetryPolicy;
use super::transport::{HubConnector, HubLink, HubReader, HubWriter};
use crate::auth::RefreshCoordinator;
use crate::domain::{AuctionId, ConnectionState, EventRegistry, HubEvent};
use crate::error::ClientError;

/// Live half of the connection plus the membership it must carry.
#[derive(Debug, Default)]
struct LinkSlot {
    writer: Option<Box<dyn HubWriter>>,
    groups: GroupMembership,
}

struct Inner {
    connector: Arc<dyn HubConnector>,
    tokens: RefreshCoordinator,
    registry: EventRegistry,
    policy: RetryPolicy,
    keepalive: Duration,
    state: watch::Sender<ConnectionState>,
    connect_gate: Mutex<()>,
    link: Mutex<LinkSlot>,
    generation: AtomicU64,
    supervisor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// How a link's read loop ended.
enum LinkEnd {
    /// Transport dropped or failed; reconnect.
    Dropped,
    /// Server closed and asked the client not to come back.
    Refused,
    /// A newer `connect()` or `disconnect()` took over.
    Superseded,
    /// The session this link authenticated with has ended.
    SessionEnded,
}

/// Owner of the single hub connection.
///
/// Cloning is cheap; clones control the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("policy", &self.inner.policy)
            .field("keepalive", &self.inner.keepalive)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    ///
    /// A zero `keepalive` disables pings.
    #[must_use]
    pub fn new(
        connector: Arc<dyn HubConnector>,
        tokens: RefreshCoordinator,
        registry: EventRegistry,
        policy: RetryPolicy,
        keepalive: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                tokens,
                registry,
                policy,
                keepalive,
                state,
                connect_gate: Mutex::new(()),
                link: Mutex::new(LinkSlot::default()),
                generation: AtomicU64::new(0),
                supervisor: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Returns `true` only while `Connected`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver for every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Registry events are dispatched to.
    #[must_use]
    pub fn registry(&self) -> &EventRegistry {
        &self.inner.registry
    }

    /// Auctions currently recorded as joined.
    pub async fn joined_auctions(&self) -> Vec<AuctionId> {
        self.inner.link.lock().await.groups.ids()
    }

    /// Opens the connection unless it is already open.
    ///
    /// Concurrent calls are serialized: a call arriving while another is
    /// connecting waits for it and then returns immediately. A call made
    /// while an attempt is pending (including one whose caller was dropped)
    /// waits until it settles. The attempt runs on its own task, so
    /// dropping the returned future still lets the state settle.
    ///
    /// # Errors
    ///
    /// - [`ClientError::SessionExpired`] if no fresh token could be
    ///   obtained.
    /// - [`ClientError::AuthRejected`] if the hub refused the token; the
    ///   session has been cleared and nothing is retried.
    /// - [`ClientError::Network`] if the first attempt failed; reconnect
    ///   attempts continue in the background, observable through
    ///   [`watch_state`](Self::watch_state).
    /// - [`ClientError::NotConnected`] if the attempt was superseded by
    ///   [`disconnect`](Self::disconnect) or the reconnect loop gave up.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let _gate = self.inner.connect_gate.lock().await;
        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                return self.await_settled().await;
            }
            ConnectionState::Disconnected => {}
        }

        let generation = {
            let _slot = self.inner.link.lock().await;
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.set_state(ConnectionState::Connecting);
            generation
        };

        // Runs detached; it alone moves the state out of `Connecting`.
        let attempt = tokio::spawn(attempt_connect(Arc::clone(&self.inner), generation));
        match attempt.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "hub connect task failed");
                self.inner
                    .settle(generation, ConnectionState::Disconnected)
                    .await;
                Err(ClientError::NotConnected)
            }
        }
    }

    async fn await_settled(&self) -> Result<(), ClientError> {
        let mut rx = self.watch_state();
        let settled = rx
            .wait_for(|state| !state.is_pending())
            .await
            .map(|state| *state);
        match settled {
            Ok(ConnectionState::Connected) => Ok(()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Closes the connection, stops reconnecting and forgets all groups.
    pub async fn disconnect(&self) {
        let writer = {
            let mut slot = self.inner.link.lock().await;
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            slot.groups.clear();
            self.inner.set_state(ConnectionState::Disconnected);
            slot.writer.take()
        };
        let supervisor = self
            .inner
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
        if let Some(mut writer) = writer {
            writer.close().await;
        }
        tracing::info!("hub disconnected");
    }

    /// Joins an auction's group.
    ///
    /// Ignored while `Disconnected`. While a connection attempt is pending
    /// the intent is recorded and sent by the replay that precedes
    /// `Connected`. Send failures are logged.
    pub async fn join(&self, auction: AuctionId) {
        let mut slot = self.inner.link.lock().await;
        match self.state() {
            ConnectionState::Disconnected => {
                tracing::debug!(auction_id = %auction, "join ignored while disconnected");
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                slot.groups.join(auction);
            }
            ConnectionState::Connected => {
                if slot.groups.join(auction) {
                    send_logged(&mut slot, &join_frame(auction)).await;
                }
            }
        }
    }

    /// Leaves an auction's group. Same state rules as [`join`](Self::join).
    pub async fn leave(&self, auction: AuctionId) {
        let mut slot = self.inner.link.lock().await;
        match self.state() {
            ConnectionState::Disconnected => {
                tracing::debug!(auction_id = %auction, "leave ignored while disconnected");
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                slot.groups.leave(auction);
            }
            ConnectionState::Connected => {
                if slot.groups.leave(auction) {
                    send_logged(&mut slot, &leave_frame(auction)).await;
                }
            }
        }
    }

    /// Asks the hub to delete a notification. Best effort: nothing is sent
    /// unless connected, and failures are only logged.
    pub async fn delete_notification(&self, id: Uuid) {
        let mut slot = self.inner.link.lock().await;
        if !self.is_connected() {
            tracing::debug!(notification_id = %id, "delete not sent; hub not connected");
            return;
        }
        let frame = HubFrame::invoke(
            DELETE_NOTIFICATION,
            vec![serde_json::Value::String(id.to_string())],
        );
        send_logged(&mut slot, &frame).await;
    }
}

async fn send_logged(slot: &mut LinkSlot, frame: &HubFrame) {
    let Some(writer) = slot.writer.as_mut() else {
        return;
    };
    if let Err(e) = writer.send(frame).await {
        tracing::warn!(error = %e, ?frame, "hub send failed");
    }
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Publishes `next` if it differs from the current state. Callers hold
    /// the link lock.
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::info!(state = ?next, "hub connection state changed");
            self.registry
                .dispatch(&HubEvent::ConnectionStateChanged(next));
        }
    }

    /// Moves to `state` and drops the writer, unless a newer lifecycle
    /// has taken over.
    async fn settle(&self, generation: u64, state: ConnectionState) {
        let writer = {
            let mut slot = self.link.lock().await;
            if !self.is_current(generation) {
                return;
            }
            self.set_state(state);
            slot.writer.take()
        };
        if let Some(mut writer) = writer {
            writer.close().await;
        }
    }

    async fn enter_reconnecting(&self, generation: u64) -> bool {
        let mut slot = self.link.lock().await;
        if !self.is_current(generation) {
            return false;
        }
        slot.writer = None;
        self.set_state(ConnectionState::Reconnecting);
        true
    }

    /// Tears the connection down for a dead session: no writer, no groups.
    async fn end_session(&self, generation: u64) {
        let writer = {
            let mut slot = self.link.lock().await;
            if !self.is_current(generation) {
                return;
            }
            slot.groups.clear();
            self.set_state(ConnectionState::Disconnected);
            slot.writer.take()
        };
        if let Some(mut writer) = writer {
            writer.close().await;
        }
    }

    async fn reject_session(&self, generation: u64) {
        if let Err(e) = self.tokens.invalidate().await {
            tracing::warn!(error = %e, "could not clear session");
        }
        self.end_session(generation).await;
    }

    /// Settles after no token could be obtained.
    async fn abandon(&self, generation: u64, error: &ClientError) {
        if error.requires_login() {
            self.end_session(generation).await;
        } else {
            self.settle(generation, ConnectionState::Disconnected).await;
        }
    }

    /// Replays group membership on a fresh link and publishes `Connected`.
    /// Returns the reader, or `None` if the lifecycle was superseded.
    async fn install(&self, generation: u64, link: HubLink) -> Option<Box<dyn HubReader>> {
        let HubLink { reader, mut writer } = link;
        let mut slot = self.link.lock().await;
        if !self.is_current(generation) {
            drop(slot);
            writer.close().await;
            return None;
        }
        let report = slot.groups.replay_all(writer.as_mut()).await;
        slot.writer = Some(writer);
        self.set_state(ConnectionState::Connected);
        tracing::info!(
            groups = report.sent,
            failed = report.failed,
            "hub connected"
        );
        Some(reader)
    }

    fn deliver(&self, target: &str, arguments: &[serde_json::Value]) {
        match HubEvent::from_invocation(target, arguments) {
            Ok(Some(event)) => {
                let report = self.registry.dispatch(&event);
                tracing::trace!(method = target, delivered = report.delivered, "hub event dispatched");
            }
            Ok(None) => tracing::debug!(method = target, "unhandled hub target"),
            Err(e) => tracing::warn!(method = target, error = %e, "undecodable hub event"),
        }
    }

    async fn send_ping(&self, generation: u64) {
        let mut slot = self.link.lock().await;
        if self.is_current(generation) {
            send_logged(&mut slot, &HubFrame::Ping).await;
        }
    }
}

async fn attempt_connect(inner: Arc<Inner>, generation: u64) -> Result<(), ClientError> {
    let ended = inner.tokens.session_ended();
    let token = match inner.tokens.ensure_fresh_access_token().await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(error = %e, "no usable token for hub connect");
            inner.abandon(generation, &e).await;
            return Err(e);
        }
    };

    match inner.connector.open(&token).await {
        Ok(link) => {
            let Some(reader) = inner.install(generation, link).await else {
                return Err(ClientError::NotConnected);
            };
            spawn_supervisor(&inner, generation, ended, Some(reader));
            Ok(())
        }
        Err(ClientError::AuthRejected) => {
            tracing::warn!("hub rejected the access token");
            inner.reject_session(generation).await;
            Err(ClientError::AuthRejected)
        }
        Err(e) => {
            tracing::warn!(error = %e, "hub connect failed; retrying in background");
            if inner.enter_reconnecting(generation).await {
                spawn_supervisor(&inner, generation, ended, None);
            }
            Err(e)
        }
    }
}

fn spawn_supervisor(
    inner: &Arc<Inner>,
    generation: u64,
    ended: watch::Receiver<u64>,
    reader: Option<Box<dyn HubReader>>,
) {
    let task = tokio::spawn(supervise(Arc::clone(inner), generation, ended, reader));
    let previous = inner
        .supervisor
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(task);
    if let Some(previous) = previous {
        previous.abort();
    }
}

async fn supervise(
    inner: Arc<Inner>,
    generation: u64,
    mut ended: watch::Receiver<u64>,
    mut reader: Option<Box<dyn HubReader>>,
) {
    loop {
        let mut current = match reader.take() {
            Some(current) => current,
            None => match reconnect(&inner, generation, &mut ended).await {
                Some(current) => current,
                None => return,
            },
        };

        match pump(&inner, generation, current.as_mut(), &mut ended).await {
            LinkEnd::Refused => {
                inner.settle(generation, ConnectionState::Disconnected).await;
                return;
            }
            LinkEnd::SessionEnded => {
                inner.end_session(generation).await;
                return;
            }
            LinkEnd::Dropped => {
                if !inner.enter_reconnecting(generation).await {
                    return;
                }
            }
            LinkEnd::Superseded => return,
        }
    }
}

/// Reads frames until the link ends.
async fn pump(
    inner: &Inner,
    generation: u64,
    reader: &mut dyn HubReader,
    ended: &mut watch::Receiver<u64>,
) -> LinkEnd {
    let pings = !inner.keepalive.is_zero();
    let mut ticker = tokio::time::interval(inner.keepalive.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            frame = reader.recv() => match frame {
                _ if !inner.is_current(generation) => return LinkEnd::Superseded,
                Ok(Some(HubFrame::Invocation { target, arguments, .. })) => {
                    inner.deliver(&target, &arguments);
                }
                Ok(Some(HubFrame::Completion { invocation_id, error: Some(error) })) => {
                    tracing::warn!(%invocation_id, %error, "hub invocation failed");
                }
                Ok(Some(HubFrame::Close { error, allow_reconnect })) => {
                    tracing::info!(?error, allow_reconnect, "hub closed by server");
                    return if allow_reconnect { LinkEnd::Dropped } else { LinkEnd::Refused };
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!("hub link dropped");
                    return LinkEnd::Dropped;
                }
                Err(ClientError::Decode(e)) => {
                    tracing::warn!(error = %e, "undecodable hub frame skipped");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "hub link failed");
                    return LinkEnd::Dropped;
                }
            },
            _ = ticker.tick(), if pings => inner.send_ping(generation).await,
            Ok(()) = ended.changed() => {
                tracing::warn!("session ended; closing hub link");
                return LinkEnd::SessionEnded;
            }
        }
    }
}

/// Runs the backoff loop. Returns the new reader once connected, or `None`
/// after settling into `Disconnected` (or being superseded).
async fn reconnect(
    inner: &Inner,
    generation: u64,
    ended: &mut watch::Receiver<u64>,
) -> Option<Box<dyn HubReader>> {
    let mut attempt = 0;
    while let Some(delay) = inner.policy.delay_for_attempt(attempt) {
        attempt += 1;
        tracing::warn!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "hub reconnect scheduled"
        );
        tokio::time::sleep(delay).await;
        if !inner.is_current(generation) {
            return None;
        }

        ended.mark_unchanged();
        let token = match inner.tokens.ensure_fresh_access_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "no usable token for hub reconnect");
                inner.abandon(generation, &e).await;
                return None;
            }
        };

        match inner.connector.open(&token).await {
            Ok(link) => return inner.install(generation, link).await,
            Err(ClientError::AuthRejected) => {
                tracing::warn!("hub rejected the access token during reconnect");
                inner.reject_session(generation).await;
                return None;
            }
            Err(e) => tracing::warn!(attempt, error = %e, "hub reconnect failed"),
        }
    }

    tracing::warn!(attempts = attempt, "hub reconnect attempts exhausted");
    inner.settle(generation, ConnectionState::Disconnected).await;
    None
}
