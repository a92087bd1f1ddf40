//! Domain types for the bridge.
//!
//! Configuration, wire envelopes, error codes and identifiers.

pub mod config;
pub mod envelope;
pub mod error;
pub mod socket_id;

// Re-exports for convenience
pub use config::{BridgeOptions, ConfigError, PermittedOptions, ServiceConfig};
pub use envelope::{ClientFrame, InboundEnvelope};
pub use error::{AuthError, BridgeError, ErrorCode};
pub use socket_id::SocketId;
