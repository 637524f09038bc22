//! WebSocket implementation of the hub transport.
//!
//! Uses `tokio-tungstenite`. The access token travels as the `access_token`
//! query parameter of the socket URL.

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::protocol::{self, HubFrame};
use super::transport::{HubConnector, HubLink, HubReader, HubWriter};
use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens hub links over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    hub_url: Url,
}

impl WsConnector {
    /// Creates a connector for the hub at `hub_url` (`http(s)` or `ws(s)`).
    #[must_use]
    pub fn new(hub_url: Url) -> Self {
        Self { hub_url }
    }

    /// Builds the socket URL for `access_token`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the hub URL has a scheme that
    /// cannot be mapped to `ws`/`wss`.
    pub fn socket_url(&self, access_token: &str) -> Result<Url, ClientError> {
        let mut url = self.hub_url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::Config(format!("unsupported hub scheme {other}")));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::Config(format!("cannot use scheme {scheme}")))?;
        url.query_pairs_mut()
            .append_pair("access_token", access_token);
        Ok(url)
    }
}

#[async_trait]
impl HubConnector for WsConnector {
    async fn open(&self, access_token: &str) -> Result<HubLink, ClientError> {
        let url = self.socket_url(access_token)?;
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(map_connect_error)?;
        let (mut sink, mut stream) = stream.split();

        sink.send(Message::text(protocol::handshake_request()))
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let pending = read_handshake(&mut stream).await?;
        tracing::debug!(host = ?self.hub_url.host_str(), "hub handshake complete");

        Ok(HubLink {
            reader: Box::new(WsReader { stream, pending }),
            writer: Box::new(WsWriter { sink }),
        })
    }
}

fn map_connect_error(err: tungstenite::Error) -> ClientError {
    match err {
        tungstenite::Error::Http(ref response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            ClientError::AuthRejected
        }
        other => ClientError::Network(other.to_string()),
    }
}

/// Waits for the handshake response. Frames the server batched after it
/// are returned for the reader to deliver first.
async fn read_handshake(
    stream: &mut SplitStream<WsStream>,
) -> Result<VecDeque<String>, ClientError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let mut frames = protocol::split_frames(text.as_str());
                let Some(first) = frames.next() else {
                    continue;
                };
                protocol::check_handshake_response(first)?;
                return Ok(frames.map(str::to_string).collect());
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(ClientError::Network(
                    "hub closed during handshake".to_string(),
                ));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ClientError::Network(e.to_string())),
        }
    }
}

/// Read half of a WebSocket hub link.
pub struct WsReader {
    stream: SplitStream<WsStream>,
    pending: VecDeque<String>,
}

impl fmt::Debug for WsReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsReader")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HubReader for WsReader {
    async fn recv(&mut self) -> Result<Option<HubFrame>, ClientError> {
        loop {
            if let Some(text) = self.pending.pop_front() {
                return HubFrame::decode(&text).map(Some);
            }
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.pending
                        .extend(protocol::split_frames(text.as_str()).map(str::to_string));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Binary, ping and pong frames carry nothing for us.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ClientError::Network(e.to_string())),
            }
        }
    }
}

/// Write half of a WebSocket hub link.
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

impl fmt::Debug for WsWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsWriter").finish_non_exhaustive()
    }
}

#[async_trait]
impl HubWriter for WsWriter {
    async fn send(&mut self, frame: &HubFrame) -> Result<(), ClientError> {
        let text = frame.encode()?;
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| ClientError::Network(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!(error = %e, "hub close was not clean");
        }
    }
}
