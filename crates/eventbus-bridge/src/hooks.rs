//! Bridge event hook.
//!
//! An optional hook sees socket lifecycle and message events and may veto
//! them. Vetoes on `SocketClosed`, `SocketPing` and `Registered` are
//! ignored; those are notifications.

use crate::domain::socket_id::SocketId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of bridge event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeEventType {
    /// Veto closes the socket immediately
    SocketCreated,
    SocketClosed,
    /// Veto keeps an idle socket open
    SocketIdle,
    SocketPing,
    Send,
    Publish,
    /// Veto drops that push silently
    Receive,
    Register,
    Registered,
    Unregister,
}

impl fmt::Display for BridgeEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SocketCreated => "SOCKET_CREATED",
            Self::SocketClosed => "SOCKET_CLOSED",
            Self::SocketIdle => "SOCKET_IDLE",
            Self::SocketPing => "SOCKET_PING",
            Self::Send => "SEND",
            Self::Publish => "PUBLISH",
            Self::Receive => "RECEIVE",
            Self::Register => "REGISTER",
            Self::Registered => "REGISTERED",
            Self::Unregister => "UNREGISTER",
        };
        f.write_str(name)
    }
}

/// Event passed to a [`BridgeHook`].
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeEvent {
    pub kind: BridgeEventType,
    pub socket_id: SocketId,
    /// Client frame or outgoing `rec` document, when there is one
    pub raw_message: Option<Value>,
}

/// Observer and gatekeeper for bridge events.
#[async_trait]
pub trait BridgeHook: Send + Sync {
    /// Return `false` to veto the event.
    async fn handle(&self, event: &BridgeEvent) -> bool;
}

/// Hook from a synchronous closure.
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F> BridgeHook for FnHook<F>
where
    F: Fn(&BridgeEvent) -> bool + Send + Sync,
{
    async fn handle(&self, event: &BridgeEvent) -> bool {
        (self.0)(event)
    }
}
