//! WebSocket transport adapter.
//!
//! Turns an upgraded axum WebSocket into a bridge socket:
//! - text and binary frames are fed to the session in arrival order
//! - outbound frames go through a bounded per-socket queue
//! - frames above the configured size are refused at the protocol level

pub mod handler;

pub use handler::{bearer_token, WebSocketHandler};
