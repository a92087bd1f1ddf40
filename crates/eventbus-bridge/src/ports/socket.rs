//! Client socket port.
//!
//! The transport owns framing and connection upgrade. It hands the bridge a
//! [`BridgeSocket`] for writes and a stream of [`TransportEvent`]s; dropping
//! the event sender is the close notification.

use crate::domain::socket_id::SocketId;
use crate::ports::identity::Identity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

/// Event delivered by the transport for one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete client frame
    Frame(Vec<u8>),
    /// Transport failure; handled like a close
    Error(String),
}

/// Write side of a client socket, shared by the session and its tasks.
pub trait BridgeSocket: Send + Sync {
    fn id(&self) -> SocketId;

    /// Identity of the caller, if the transport resolved one.
    fn identity(&self) -> Option<Arc<dyn Identity>>;

    /// Queue a text frame. Returns false if the frame was not accepted.
    fn write(&self, frame: String) -> bool;

    /// Close the connection. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Frame queued for the transport writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// [`BridgeSocket`] backed by a bounded channel.
///
/// Frames are dropped rather than awaited when the queue is full, so a slow
/// client never stalls the bus.
pub struct ChannelSocket {
    id: SocketId,
    identity: Option<Arc<dyn Identity>>,
    outbound: mpsc::Sender<OutboundFrame>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl ChannelSocket {
    /// Create a socket and the receiver the transport drains.
    pub fn new(
        identity: Option<Arc<dyn Identity>>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundFrame>) {
        let (outbound, receiver) = mpsc::channel(capacity.max(1));
        let socket = Arc::new(Self {
            id: SocketId::new(),
            identity,
            outbound,
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        });
        (socket, receiver)
    }

    /// Resolves once [`BridgeSocket::close`] has been called.
    pub async fn closed(&self) {
        let notified = self.close_signal.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent close is not missed
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

impl BridgeSocket for ChannelSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn identity(&self) -> Option<Arc<dyn Identity>> {
        self.identity.clone()
    }

    fn write(&self, frame: String) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.outbound.try_send(OutboundFrame::Text(frame)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(socket_id = %self.id, "Send queue full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Best effort; the writer also stops once every sender is gone.
        if self.outbound.try_send(OutboundFrame::Close).is_err() {
            debug!(socket_id = %self.id, "Close frame not queued");
        }
        self.close_signal.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
