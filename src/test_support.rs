//! Fakes and builders shared by unit tests.

#![allow(clippy::panic)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::api::request::{ApiRequest, ApiResponse, HttpSend};
use crate::auth::{TokenExchange, TokenPair};
use crate::domain::{Clock, NotificationRecord, NotificationSeverity};
use crate::error::ClientError;
use crate::hub::{HubConnector, HubFrame, HubLink, HubReader, HubWriter};

static TOKEN_SERIAL: AtomicU64 = AtomicU64::new(1);

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unsigned JWT with the given payload.
pub fn jwt_with_claims(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// Unique JWT whose `exp` lies `secs` seconds from now.
pub fn jwt_expiring_in(secs: i64) -> String {
    let serial = TOKEN_SERIAL.fetch_add(1, Ordering::Relaxed);
    jwt_with_claims(&serde_json::json!({
        "exp": Utc::now().timestamp() + secs,
        "sub": "user-1",
        "email": "grower@example.com",
        "role": "Wholesaler",
        "jti": serial.to_string(),
    }))
}

/// Unread info notification with a fresh id.
pub fn notification(title: &str) -> NotificationRecord {
    NotificationRecord {
        id: uuid::Uuid::new_v4(),
        user_id: "user-1".to_string(),
        notification_type: "BidOutbid".to_string(),
        severity: NotificationSeverity::Info,
        title: title.to_string(),
        message: format!("{title} message"),
        is_read: false,
        read_at: None,
        related_entity_id: None,
        related_entity_type: None,
        created_at: Utc::now(),
    }
}

/// Clock frozen at construction time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn current() -> Self {
        Self(Utc::now())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// [`HttpSend`] that answers from a script and records what was sent.
#[derive(Debug, Default)]
pub struct ScriptedSender {
    responses: Mutex<VecDeque<Result<ApiResponse, ClientError>>>,
    sent: Mutex<Vec<(ApiRequest, Option<String>)>>,
}

impl ScriptedSender {
    pub fn new(responses: Vec<Result<ApiResponse, ClientError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(ApiRequest, Option<String>)> {
        lock(&self.sent).clone()
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        lock(&self.sent).iter().map(|(_, b)| b.clone()).collect()
    }
}

#[async_trait]
impl HttpSend for ScriptedSender {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        lock(&self.sent).push((request.clone(), bearer.map(str::to_string)));
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Network("script exhausted".to_string())))
    }
}

#[derive(Debug, Clone, Copy)]
enum ExchangeMode {
    Succeed,
    Reject,
    Network,
}

/// [`TokenExchange`] with a fixed outcome, counting calls.
#[derive(Debug)]
pub struct ScriptedExchange {
    mode: ExchangeMode,
    delay: Duration,
    seen: Mutex<Vec<String>>,
}

impl ScriptedExchange {
    fn with_mode(mode: ExchangeMode) -> Self {
        Self {
            mode,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Issues a fresh one-hour pair on every call.
    pub fn succeeding() -> Self {
        Self::with_mode(ExchangeMode::Succeed)
    }

    pub fn rejecting() -> Self {
        Self::with_mode(ExchangeMode::Reject)
    }

    pub fn failing_network() -> Self {
        Self::with_mode(ExchangeMode::Network)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.seen).len()
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl TokenExchange for ScriptedExchange {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        let n = {
            let mut seen = lock(&self.seen);
            seen.push(refresh_token.to_string());
            seen.len()
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.mode {
            ExchangeMode::Succeed => Ok(TokenPair {
                access_token: jwt_expiring_in(3600),
                refresh_token: format!("r{}", n + 1),
            }),
            ExchangeMode::Reject => Err(ClientError::AuthRejected),
            ExchangeMode::Network => Err(ClientError::Network("unreachable".to_string())),
        }
    }
}

/// [`HubWriter`] that records frames into a shared log.
#[derive(Debug, Default, Clone)]
pub struct RecordingWriter {
    log: Arc<Mutex<Vec<HubFrame>>>,
    fail: bool,
}

impl RecordingWriter {
    pub fn failing() -> Self {
        Self {
            log: Arc::default(),
            fail: true,
        }
    }

    pub fn frames(&self) -> Vec<HubFrame> {
        lock(&self.log).clone()
    }
}

#[async_trait]
impl HubWriter for RecordingWriter {
    async fn send(&mut self, frame: &HubFrame) -> Result<(), ClientError> {
        if self.fail {
            return Err(ClientError::Network("write failed".to_string()));
        }
        lock(&self.log).push(frame.clone());
        Ok(())
    }

    async fn close(&mut self) {}
}

#[derive(Debug)]
struct ChannelReader {
    rx: mpsc::UnboundedReceiver<HubFrame>,
}

#[async_trait]
impl HubReader for ChannelReader {
    async fn recv(&mut self) -> Result<Option<HubFrame>, ClientError> {
        Ok(self.rx.recv().await)
    }
}

/// Scripted result of one [`FakeConnector::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Open,
    Reject,
    Fail,
}

/// [`HubConnector`] whose links are driven from the test.
///
/// Every link shares one frame log. The most recent link can be fed server
/// frames with [`push`](Self::push) or cut with [`drop_link`](Self::drop_link).
#[derive(Debug)]
pub struct FakeConnector {
    script: Mutex<VecDeque<OpenOutcome>>,
    fallback: OpenOutcome,
    delay: Duration,
    opens: AtomicUsize,
    tokens: Mutex<Vec<String>>,
    writer: RecordingWriter,
    server: Mutex<Option<mpsc::UnboundedSender<HubFrame>>>,
}

impl FakeConnector {
    /// Plays `script` in order, then answers `fallback` forever.
    pub fn scripted(script: Vec<OpenOutcome>, fallback: OpenOutcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            opens: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
            writer: RecordingWriter::default(),
            server: Mutex::new(None),
        }
    }

    /// Always opens.
    pub fn healthy() -> Self {
        Self::scripted(Vec::new(), OpenOutcome::Open)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<String> {
        lock(&self.tokens).clone()
    }

    pub fn frames(&self) -> Vec<HubFrame> {
        self.writer.frames()
    }

    /// Invocations sent with `target`, in order.
    pub fn invocations(&self, target: &str) -> Vec<Vec<serde_json::Value>> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                HubFrame::Invocation {
                    target: t,
                    arguments,
                    ..
                } if t == target => Some(arguments),
                _ => None,
            })
            .collect()
    }

    /// Delivers `frame` on the current link.
    pub fn push(&self, frame: HubFrame) {
        let server = lock(&self.server);
        let Some(tx) = server.as_ref() else {
            panic!("no open link");
        };
        if tx.send(frame).is_err() {
            panic!("link reader is gone");
        }
    }

    /// Simulates the transport dropping.
    pub fn drop_link(&self) {
        lock(&self.server).take();
    }
}

#[async_trait]
impl HubConnector for FakeConnector {
    async fn open(&self, access_token: &str) -> Result<HubLink, ClientError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        lock(&self.tokens).push(access_token.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = lock(&self.script).pop_front().unwrap_or(self.fallback);
        match outcome {
            OpenOutcome::Open => {
                let (tx, rx) = mpsc::unbounded_channel();
                *lock(&self.server) = Some(tx);
                Ok(HubLink {
                    reader: Box::new(ChannelReader { rx }),
                    writer: Box::new(self.writer.clone()),
                })
            }
            OpenOutcome::Reject => Err(ClientError::AuthRejected),
            OpenOutcome::Fail => Err(ClientError::Network("connection refused".to_string())),
        }
    }
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
