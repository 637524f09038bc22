//! Domain layer: session and claims model, hub events, notifications, and
//! the event fan-out registry.
//!
//! Nothing in here performs I/O; the `auth`, `api` and `hub` layers build on
//! these types.

pub mod auction_id;
pub mod claims;
pub mod clock;
pub mod event_registry;
pub mod hub_event;
pub mod notification;
pub mod session;

pub use auction_id::AuctionId;
pub use claims::{ClaimsError, TokenClaims};
pub use clock::{Clock, SystemClock};
pub use event_registry::{DispatchReport, EventRegistry, HandlerError, Subscription};
pub use hub_event::{BidPlaced, BuyNowExecuted, ConnectionState, EventKind, HubEvent, SystemNotice};
pub use notification::{NotificationFeed, NotificationRecord, NotificationSeverity};
pub use session::{Session, SessionFlags, UserRole};
