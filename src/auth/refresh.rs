//! Single-flight access-token refresh.
//!
//! Refresh tokens are single-use: two concurrent exchanges with the same
//! refresh token would leave one caller holding a rotated-away token. The
//! [`RefreshCoordinator`] therefore keeps at most one exchange in flight.
//! Callers that need a fresh token while an exchange is pending await that
//! exchange's shared result instead of starting their own.
//!
//! A failed exchange is terminal: the session is cleared and every waiter
//! receives [`ClientError::SessionExpired`]. Nothing here retries.
//!
//! Every terminal end of the session, whether a failed exchange or an
//! explicit [`RefreshCoordinator::invalidate`], bumps a counter published
//! through [`RefreshCoordinator::session_ended`] so long-lived users of the
//! session (the hub connection) can tear down.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, watch};

use super::exchange::TokenExchange;
use super::token_store::TokenStore;
use crate::domain::claims::token_is_stale;
use crate::domain::{Clock, Session};
use crate::error::ClientError;

type RefreshFuture = Shared<BoxFuture<'static, Result<String, ClientError>>>;

struct Inner {
    store: Arc<dyn TokenStore>,
    exchange: Arc<dyn TokenExchange>,
    clock: Arc<dyn Clock>,
    margin: chrono::Duration,
    inflight: Mutex<Option<RefreshFuture>>,
    exchanges: AtomicU64,
    ended: watch::Sender<u64>,
}

impl Inner {
    fn announce_end(&self) {
        self.ended.send_modify(|count| *count += 1);
    }
}

/// Gatekeeper for every token refresh in the process.
///
/// Cloning is cheap; clones share the same in-flight slot.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("store", &self.inner.store)
            .field("margin", &self.inner.margin)
            .field("exchanges", &self.exchange_count())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Creates a coordinator. Tokens with less than `margin` of lifetime
    /// left are considered stale.
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        exchange: Arc<dyn TokenExchange>,
        clock: Arc<dyn Clock>,
        margin: std::time::Duration,
    ) -> Self {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        Self {
            inner: Arc::new(Inner {
                store,
                exchange,
                clock,
                margin,
                inflight: Mutex::new(None),
                exchanges: AtomicU64::new(0),
                ended: watch::channel(0).0,
            }),
        }
    }

    /// The store this coordinator guards.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    /// Returns a usable access token, refreshing it first if it is stale.
    ///
    /// # Errors
    ///
    /// - [`ClientError::SessionExpired`] if no session is stored or the
    ///   exchange failed (the session has then been cleared).
    /// - [`ClientError::Storage`] if the store cannot be read.
    pub async fn ensure_fresh_access_token(&self) -> Result<String, ClientError> {
        let Some(token) = self.inner.store.access_token().await? else {
            return Err(ClientError::SessionExpired);
        };
        if !self.is_stale(&token) {
            return Ok(token);
        }
        tracing::debug!("access token inside safety margin");
        self.refresh_shared(None).await
    }

    /// Obtains a replacement for a token the server just rejected, even if
    /// it still looked fresh locally.
    ///
    /// If another caller already replaced `rejected` with a fresh token, that
    /// token is returned without a new exchange.
    ///
    /// # Errors
    ///
    /// Same as [`ensure_fresh_access_token`](Self::ensure_fresh_access_token).
    pub async fn refresh_after_rejection(&self, rejected: &str) -> Result<String, ClientError> {
        self.refresh_shared(Some(rejected)).await
    }

    /// Clears the session after a terminal authentication failure.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the store cannot be cleared.
    pub async fn invalidate(&self) -> Result<(), ClientError> {
        tracing::info!("session invalidated");
        let cleared = self.inner.store.clear().await;
        self.inner.announce_end();
        cleared
    }

    /// Receiver whose value changes each time the session ends.
    #[must_use]
    pub fn session_ended(&self) -> watch::Receiver<u64> {
        self.inner.ended.subscribe()
    }

    /// Number of exchanges sent since construction.
    #[must_use]
    pub fn exchange_count(&self) -> u64 {
        self.inner.exchanges.load(Ordering::SeqCst)
    }

    fn is_stale(&self, token: &str) -> bool {
        token_is_stale(token, self.inner.clock.now(), self.inner.margin)
    }

    async fn refresh_shared(&self, rejected: Option<&str>) -> Result<String, ClientError> {
        let pending = {
            let mut slot = self.inner.inflight.lock().await;
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    // Re-check under the gate: an exchange may have finished
                    // between the caller's read and now.
                    let Some(session) = self.inner.store.load().await? else {
                        return Err(ClientError::SessionExpired);
                    };
                    if self.is_reusable(&session, rejected) {
                        return Ok(session.access_token);
                    }
                    let pending = run_exchange(Arc::clone(&self.inner), session.refresh_token)
                        .boxed()
                        .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    fn is_reusable(&self, session: &Session, rejected: Option<&str>) -> bool {
        !self.is_stale(&session.access_token)
            && rejected.is_none_or(|r| r != session.access_token)
    }
}

async fn run_exchange(inner: Arc<Inner>, refresh_token: String) -> Result<String, ClientError> {
    let attempt = inner.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::info!(attempt, "exchanging refresh token");

    let outcome = match inner.exchange.exchange(&refresh_token).await {
        Ok(pair) => match inner
            .store
            .set_session(&pair.access_token, &pair.refresh_token)
            .await
        {
            Ok(()) => Ok(pair.access_token),
            Err(e) => {
                tracing::warn!(error = %e, "could not persist refreshed tokens");
                terminate(&inner).await
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "refresh exchange failed; session terminated");
            terminate(&inner).await
        }
    };

    *inner.inflight.lock().await = None;
    outcome
}

async fn terminate(inner: &Inner) -> Result<String, ClientError> {
    if let Err(e) = inner.store.clear().await {
        tracing::warn!(error = %e, "could not clear token store");
    }
    inner.announce_end();
    Err(ClientError::SessionExpired)
}
