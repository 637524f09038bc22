//! # agrimarket-client
//!
//! Session-token lifecycle and realtime auction synchronization for the
//! agricultural marketplace client.
//!
//! The crate keeps one durable hub connection alive, refreshes the bearer
//! token without ever running two exchanges at once, and fans server
//! pushes out to any number of subscribers. Screens and navigation are
//! out of scope; they consume [`MarketClient`] and the
//! [`EventRegistry`](domain::EventRegistry).
//!
//! ## Architecture
//!
//! ```text
//! UI surfaces
//!     │
//!     ├── MarketClient (client)
//!     │
//!     ├── AuthenticatedClient ── NotificationService (api/)
//!     ├── ConnectionManager ── GroupMembership (hub/)
//!     │        │
//!     │        └── EventRegistry (domain/)
//!     │
//!     ├── RefreshCoordinator (auth/)   single-flight token refresh
//!     │
//!     └── TokenStore (auth/)           memory or file backed
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;

#[cfg(test)]
mod test_support;

pub use client::{ClientParts, MarketClient};
pub use config::ClientConfig;
pub use error::ClientError;
