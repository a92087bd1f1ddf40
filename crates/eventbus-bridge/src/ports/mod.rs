//! Ports to the collaborators the bridge does not own: the identity oracle
//! and the client socket transport.

pub mod identity;
pub mod socket;

pub use identity::{Identity, IdentityEntry, IdentityProvider, StaticIdentity, TokenIdentityProvider};
pub use socket::{BridgeSocket, ChannelSocket, OutboundFrame, TransportEvent};
