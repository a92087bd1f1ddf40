// Allow missing docs for internal items
#![allow(missing_docs)]

//! Event Bus Bridge - exposes an address-based message bus to untrusted
//! socket clients.
//!
//! # Architecture
//!
//! ```text
//!  client ──frames──► ┌──────────────────────────────────────────┐
//!                     │ SocketSession (one actor per socket)     │
//!                     │   envelope decode → hook → permission    │
//!                     │   → identity check → bus send/publish/   │
//!                     │     consume                              │
//!                     │   RegistrationTable   LivenessMonitor    │
//!                     └───────────────┬──────────────────────────┘
//!                                     │ shared
//!                     ┌───────────────┴──────────────────────────┐
//!                     │ PermissionMatcher  PatternCache          │
//!                     │ ReplyTrustTracker  BridgeHook  stats     │
//!                     └───────────────┬──────────────────────────┘
//!                                     ▼
//!                                 EventBus
//! ```
//!
//! Inbound frames are checked against `inboundPermitted`, messages pushed
//! to registered clients against `outboundPermitted`. Both lists are
//! first-match and deny by default. Denied inbound actions answer with an
//! `err` frame; filtered pushes are dropped without telling the client.
//!
//! # Usage
//!
//! ```ignore
//! use eventbus_bridge::{BridgeOptions, EventBusBridge, PermittedOptions};
//!
//! let options = BridgeOptions::default()
//!     .add_inbound_permitted(PermittedOptions::new().address("news.uk"))
//!     .add_outbound_permitted(PermittedOptions::new().address_regex("news\\..+"));
//! let bridge = EventBusBridge::new(bus, options)?;
//! bridge.spawn_socket(socket, frames);
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bridge;
pub mod domain;
pub mod hooks;
pub mod permission;
pub mod ports;
pub mod reply_trust;
pub mod service;
pub mod session;
pub mod ws;

// Re-exports for public API
pub use bridge::{BridgeBuilder, BridgeStats, EventBusBridge, StatsSnapshot};
pub use domain::config::{BridgeOptions, ConfigError, PermittedOptions, ServiceConfig};
pub use domain::error::{AuthError, BridgeError, ErrorCode};
pub use domain::socket_id::SocketId;
pub use hooks::{BridgeEvent, BridgeEventType, BridgeHook, FnHook};
pub use permission::{Direction, Match, PermissionMatcher, Requirement};
pub use ports::identity::{
    Identity, IdentityEntry, IdentityProvider, StaticIdentity, TokenIdentityProvider,
};
pub use ports::socket::{BridgeSocket, ChannelSocket, OutboundFrame, TransportEvent};
pub use reply_trust::ReplyTrustTracker;
pub use service::{BridgeService, ServiceHandle};
pub use session::MAX_REPLY_ADDRESS_LENGTH;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
