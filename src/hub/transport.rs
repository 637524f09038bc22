//! Transport seam for the hub connection.
//!
//! The connection manager only sees [`HubConnector`], [`HubReader`] and
//! [`HubWriter`]; the WebSocket implementation lives in
//! [`ws_transport`](super::ws_transport). Read and write halves are split so
//! the reader can sit in the supervisor task while callers send through the
//! writer.

use std::fmt;

use async_trait::async_trait;

use super::protocol::HubFrame;
use crate::error::ClientError;

/// Read half of an open hub link.
#[async_trait]
pub trait HubReader: Send + fmt::Debug {
    /// Receives the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] when the link fails, or
    /// [`ClientError::Decode`] for an undecodable frame.
    async fn recv(&mut self) -> Result<Option<HubFrame>, ClientError>;
}

/// Write half of an open hub link.
#[async_trait]
pub trait HubWriter: Send + fmt::Debug {
    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] when the link fails.
    async fn send(&mut self, frame: &HubFrame) -> Result<(), ClientError>;

    /// Closes the link. Errors are not reported; the link is gone either way.
    async fn close(&mut self);
}

/// A handshaken hub connection, split into halves.
#[derive(Debug)]
pub struct HubLink {
    /// Inbound half.
    pub reader: Box<dyn HubReader>,
    /// Outbound half.
    pub writer: Box<dyn HubWriter>,
}

/// Opens hub links.
#[async_trait]
pub trait HubConnector: Send + Sync + fmt::Debug {
    /// Opens a link authenticated with `access_token` and completes the
    /// protocol handshake.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AuthRejected`] if the server refused the token.
    /// - [`ClientError::Network`] for any other failure.
    async fn open(&self, access_token: &str) -> Result<HubLink, ClientError>;
}
