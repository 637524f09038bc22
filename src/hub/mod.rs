//! Realtime auction hub: wire protocol, transport, group membership and
//! the connection manager that ties them together.

pub mod connection;
pub mod groups;
pub mod protocol;
pub mod retry;
pub mod transport;
pub mod ws_transport;

pub use connection::ConnectionManager;
pub use groups::{GroupMembership, ReplayReport};
pub use protocol::HubFrame;
pub use retry::RetryPolicy;
pub use transport::{HubConnector, HubLink, HubReader, HubWriter};
pub use ws_transport::WsConnector;
