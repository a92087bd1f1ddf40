//! Bridge Engine entry point.
//!
//! [`EventBusBridge`] owns the state shared by every socket (rules, pattern
//! cache, reply trust, hook, statistics) and runs one session per socket.

use crate::domain::config::{BridgeOptions, ConfigError};
use crate::domain::socket_id::SocketId;
use crate::hooks::{BridgeEvent, BridgeEventType, BridgeHook};
use crate::permission::{PatternCache, PermissionMatcher};
use crate::ports::socket::{BridgeSocket, TransportEvent};
use crate::reply_trust::ReplyTrustTracker;
use crate::session::SocketSession;
use serde::Serialize;
use serde_json::Value;
use shared_bus::EventBus;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Bridge counters
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub sockets_opened: AtomicU64,
    pub sockets_closed: AtomicU64,
    pub live_sockets: AtomicUsize,
    pub frames_received: AtomicU64,
    pub messages_delivered: AtomicU64,
    pub pushes_filtered: AtomicU64,
    pub errors_sent: AtomicU64,
}

impl BridgeStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sockets_opened: self.sockets_opened.load(Ordering::Relaxed),
            sockets_closed: self.sockets_closed.load(Ordering::Relaxed),
            live_sockets: self.live_sockets.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            pushes_filtered: self.pushes_filtered.load(Ordering::Relaxed),
            errors_sent: self.errors_sent.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BridgeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub sockets_opened: u64,
    pub sockets_closed: u64,
    pub live_sockets: usize,
    pub frames_received: u64,
    pub messages_delivered: u64,
    pub pushes_filtered: u64,
    pub errors_sent: u64,
}

/// State shared by all sessions of one bridge.
pub(crate) struct BridgeContext {
    pub bus: Arc<dyn EventBus>,
    pub options: BridgeOptions,
    pub matcher: PermissionMatcher,
    pub trust: Arc<ReplyTrustTracker>,
    pub hook: Option<Arc<dyn BridgeHook>>,
    pub stats: BridgeStats,
}

impl BridgeContext {
    /// Run the hook, if any. Without a hook every event is approved.
    pub async fn call_hook(
        &self,
        kind: BridgeEventType,
        socket_id: SocketId,
        raw_message: Option<&Value>,
    ) -> bool {
        let Some(hook) = &self.hook else {
            return true;
        };
        let event = BridgeEvent {
            kind,
            socket_id,
            raw_message: raw_message.cloned(),
        };
        let approved = hook.handle(&event).await;
        if !approved {
            debug!(socket_id = %socket_id, event = %kind, "Bridge event vetoed by hook");
        }
        approved
    }

    /// Trust a reply address the client is expected to answer on.
    pub fn grant_reply_trust(&self, reply_address: Option<&str>) {
        if let Some(reply_address) = reply_address {
            self.trust.grant(reply_address);
        }
    }
}

/// Builder for [`EventBusBridge`]
pub struct BridgeBuilder {
    bus: Arc<dyn EventBus>,
    options: BridgeOptions,
    hook: Option<Arc<dyn BridgeHook>>,
}

impl BridgeBuilder {
    #[must_use]
    pub fn hook(mut self, hook: Arc<dyn BridgeHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Validate the options and build the bridge.
    pub fn build(self) -> Result<EventBusBridge, ConfigError> {
        self.options.validate()?;

        let trust = Arc::new(ReplyTrustTracker::new(self.options.reply_timeout));
        let matcher = PermissionMatcher::new(
            &self.options,
            Arc::new(PatternCache::new()),
            Arc::clone(&trust),
        );

        Ok(EventBusBridge {
            ctx: Arc::new(BridgeContext {
                bus: self.bus,
                options: self.options,
                matcher,
                trust,
                hook: self.hook,
                stats: BridgeStats::default(),
            }),
        })
    }
}

/// Socket-to-bus bridge.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct EventBusBridge {
    ctx: Arc<BridgeContext>,
}

impl EventBusBridge {
    /// Create a bridge without a hook.
    pub fn new(bus: Arc<dyn EventBus>, options: BridgeOptions) -> Result<Self, ConfigError> {
        Self::builder(bus, options).build()
    }

    pub fn builder(bus: Arc<dyn EventBus>, options: BridgeOptions) -> BridgeBuilder {
        BridgeBuilder {
            bus,
            options,
            hook: None,
        }
    }

    /// Serve one socket until it closes.
    ///
    /// Frames from `events` are processed strictly in order. The session ends
    /// when the sender side is dropped, on a transport error, or when the
    /// bridge closes the socket for inactivity.
    pub async fn handle_socket(
        &self,
        socket: Arc<dyn BridgeSocket>,
        events: mpsc::Receiver<TransportEvent>,
    ) {
        SocketSession::new(Arc::clone(&self.ctx), socket)
            .run(events)
            .await;
    }

    /// [`Self::handle_socket`] on a new task.
    pub fn spawn_socket(
        &self,
        socket: Arc<dyn BridgeSocket>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move { bridge.handle_socket(socket, events).await })
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.ctx.options
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    pub fn live_sockets(&self) -> usize {
        self.ctx.stats.live_sockets.load(Ordering::Relaxed)
    }

    pub fn reply_trust(&self) -> &ReplyTrustTracker {
        &self.ctx.trust
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.ctx.bus
    }
}
