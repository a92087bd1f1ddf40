//! # Event Bus
//!
//! Defines the producing side of the bus and the in-memory implementation.

use crate::message::{BusMessage, DeliveryOptions, ReplyFailure};
use crate::subscriber::{ConsumerRegistry, MessageConsumer};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc::error::TrySendError, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

type ReplyResult = Result<BusMessage, ReplyFailure>;

/// Address-based message bus.
///
/// Consumers register per address; producers reach them with point-to-point
/// `send`, `request` (send and await one reply) or fan-out `publish`.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Deliver to one consumer of `address`.
    ///
    /// # Returns
    ///
    /// `true` if a consumer (or a pending request) accepted the message.
    async fn send(&self, address: &str, body: Value, options: DeliveryOptions) -> bool;

    /// Deliver to one consumer of `address` and wait for its reply.
    ///
    /// The delivered message carries a fresh correlation address in
    /// `reply_address`; whatever is next sent there completes this call.
    async fn request(&self, address: &str, body: Value, options: DeliveryOptions) -> ReplyResult;

    /// Deliver to every consumer of `address`.
    ///
    /// # Returns
    ///
    /// The number of consumers that accepted the message.
    async fn publish(&self, address: &str, body: Value, options: DeliveryOptions) -> usize;

    /// Register a consumer on `address`.
    fn consume(&self, address: &str) -> MessageConsumer;

    /// Complete the request waiting on `reply_address` with a failure.
    fn fail(&self, reply_address: &str, failure_code: i32, message: &str) -> bool;

    /// Reply to a received message. No-op if the sender did not ask for one.
    async fn reply(&self, message: &BusMessage, body: Value) -> bool {
        match message.reply_address.as_deref() {
            Some(reply_address) => self.send(reply_address, body, DeliveryOptions::default()).await,
            None => false,
        }
    }

    /// Reply to a received message and wait for the reply to that reply.
    async fn reply_and_request(
        &self,
        message: &BusMessage,
        body: Value,
        options: DeliveryOptions,
    ) -> ReplyResult {
        match message.reply_address.as_deref() {
            Some(reply_address) => self.request(reply_address, body, options).await,
            None => Err(ReplyFailure::no_handlers(&message.address)),
        }
    }
}

/// Counters exposed by [`InMemoryEventBus`].
#[derive(Debug, Default)]
pub struct BusStats {
    pub sent: AtomicU64,
    pub published: AtomicU64,
    pub replies: AtomicU64,
    pub undelivered: AtomicU64,
    pub timeouts: AtomicU64,
}

/// In-memory implementation of the bus.
///
/// Each consumer owns a bounded `mpsc` channel; point-to-point delivery
/// rotates across the consumers of an address and skips saturated ones.
/// Suitable for single-node operation.
pub struct InMemoryEventBus {
    /// Registered consumers by address.
    consumers: Arc<ConsumerRegistry>,

    /// Requests awaiting a reply, keyed by correlation address.
    pending: DashMap<String, oneshot::Sender<ReplyResult>>,

    /// Round-robin cursor for point-to-point delivery.
    cursor: AtomicUsize,

    stats: BusStats,

    /// Per-consumer channel capacity.
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory bus with default consumer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with the given consumer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            consumers: Arc::new(ConsumerRegistry::default()),
            pending: DashMap::new(),
            cursor: AtomicUsize::new(0),
            stats: BusStats::default(),
            capacity,
        }
    }

    /// Number of consumers registered on `address`.
    #[must_use]
    pub fn consumer_count(&self, address: &str) -> usize {
        self.consumers.count(address)
    }

    /// Number of consumers across all addresses.
    #[must_use]
    pub fn total_consumers(&self) -> usize {
        self.consumers.total()
    }

    /// Number of requests still waiting for a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &BusStats {
        &self.stats
    }

    /// Point-to-point routing shared by `send` and `request`.
    fn route(&self, message: BusMessage) -> bool {
        // A pending correlation address takes precedence over consumers.
        if let Some((_, waiter)) = self.pending.remove(&message.address) {
            let address = message.address.clone();
            if waiter.send(Ok(message)).is_err() {
                debug!(address = %address, "Requester gone, reply dropped");
                return false;
            }
            self.stats.replies.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        let slots = self.consumers.snapshot(&message.address);
        if slots.is_empty() {
            self.stats.undelivered.fetch_add(1, Ordering::Relaxed);
            debug!(address = %message.address, "No handlers, message dropped");
            return false;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let mut message = message;
        for offset in 0..slots.len() {
            let slot = &slots[(start + offset) % slots.len()];
            match slot.sender.try_send(message) {
                Ok(()) => return true,
                Err(TrySendError::Full(m) | TrySendError::Closed(m)) => message = m,
            }
        }

        self.stats.undelivered.fetch_add(1, Ordering::Relaxed);
        warn!(
            address = %message.address,
            consumers = slots.len(),
            "All consumers saturated, message dropped"
        );
        false
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn send(&self, address: &str, body: Value, options: DeliveryOptions) -> bool {
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        let message = BusMessage::new(address, body).with_headers(options.headers);
        self.route(message)
    }

    async fn request(&self, address: &str, body: Value, options: DeliveryOptions) -> ReplyResult {
        self.stats.sent.fetch_add(1, Ordering::Relaxed);

        let correlation = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation.clone(), tx);

        let message = BusMessage::new(address, body)
            .with_headers(options.headers)
            .with_reply_address(correlation.clone());
        if !self.route(message) {
            self.pending.remove(&correlation);
            return Err(ReplyFailure::no_handlers(address));
        }

        match tokio::time::timeout(options.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ReplyFailure::no_handlers(address)),
            Err(_) => {
                self.pending.remove(&correlation);
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                debug!(address = %address, reply_address = %correlation, "Request timed out");
                Err(ReplyFailure::timeout(address, options.timeout))
            }
        }
    }

    async fn publish(&self, address: &str, body: Value, options: DeliveryOptions) -> usize {
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        let message = BusMessage::new(address, body).with_headers(options.headers);

        let delivered = self
            .consumers
            .snapshot(address)
            .iter()
            .filter(|slot| slot.sender.try_send(message.clone()).is_ok())
            .count();

        if delivered == 0 {
            self.stats.undelivered.fetch_add(1, Ordering::Relaxed);
        }
        debug!(address = %address, receivers = delivered, "Message published");
        delivered
    }

    fn consume(&self, address: &str) -> MessageConsumer {
        let (id, receiver) = self.consumers.add(address, self.capacity);
        debug!(address = %address, "Consumer registered");
        MessageConsumer::new(address.to_string(), id, receiver, self.consumers.clone())
    }

    fn fail(&self, reply_address: &str, failure_code: i32, message: &str) -> bool {
        let Some((_, waiter)) = self.pending.remove(reply_address) else {
            return false;
        };
        waiter
            .send(Err(ReplyFailure::recipient(failure_code, message)))
            .is_ok()
    }
}
