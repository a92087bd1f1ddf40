//! # Message Consumer
//!
//! Defines the consuming side of the bus.

use crate::message::BusMessage;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors from consumer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// The consumer was cancelled or the bus was dropped.
    #[error("Consumer closed")]
    Closed,
}

/// One registered consumer channel.
#[derive(Clone)]
pub(crate) struct ConsumerSlot {
    pub id: u64,
    pub sender: mpsc::Sender<BusMessage>,
}

/// Consumers by address, shared between the bus and its consumer handles.
#[derive(Default)]
pub(crate) struct ConsumerRegistry {
    slots: RwLock<HashMap<String, Vec<ConsumerSlot>>>,
    next_id: AtomicU64,
}

impl ConsumerRegistry {
    pub fn add(&self, address: &str, capacity: usize) -> (u64, mpsc::Receiver<BusMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots
            .write()
            .entry(address.to_string())
            .or_default()
            .push(ConsumerSlot { id, sender });
        (id, receiver)
    }

    /// Removes one consumer. Returns false if it was already gone.
    pub fn remove(&self, address: &str, id: u64) -> bool {
        let mut slots = self.slots.write();
        let Some(list) = slots.get_mut(address) else {
            return false;
        };
        let before = list.len();
        list.retain(|slot| slot.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            slots.remove(address);
        }
        removed
    }

    pub fn contains(&self, address: &str, id: u64) -> bool {
        self.slots
            .read()
            .get(address)
            .is_some_and(|list| list.iter().any(|slot| slot.id == id))
    }

    pub fn snapshot(&self, address: &str) -> Vec<ConsumerSlot> {
        self.slots.read().get(address).cloned().unwrap_or_default()
    }

    pub fn count(&self, address: &str) -> usize {
        self.slots.read().get(address).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.slots.read().values().map(Vec::len).sum()
    }
}

/// A registered consumer for one address.
///
/// When dropped, the consumer is automatically unregistered.
pub struct MessageConsumer {
    address: String,
    id: u64,
    receiver: mpsc::Receiver<BusMessage>,
    registry: Arc<ConsumerRegistry>,
}

impl MessageConsumer {
    pub(crate) fn new(
        address: String,
        id: u64,
        receiver: mpsc::Receiver<BusMessage>,
        registry: Arc<ConsumerRegistry>,
    ) -> Self {
        Self {
            address,
            id,
            receiver,
            registry,
        }
    }

    /// Address this consumer listens on.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Receive the next message.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - The next message delivered to this consumer
    /// - `None` - The consumer was cancelled and its buffer is drained
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Try to receive the next message without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(message))` - A message was available
    /// - `Ok(None)` - No message available (would block)
    /// - `Err(ConsumerError::Closed)` - The consumer was cancelled
    pub fn try_recv(&mut self) -> Result<Option<BusMessage>, ConsumerError> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(ConsumerError::Closed),
        }
    }

    /// Handle that can cancel this consumer from elsewhere.
    #[must_use]
    pub fn handle(&self) -> ConsumerHandle {
        ConsumerHandle {
            address: self.address.clone(),
            id: self.id,
            registry: Arc::downgrade(&self.registry),
        }
    }
}

impl Drop for MessageConsumer {
    fn drop(&mut self) {
        if self.registry.remove(&self.address, self.id) {
            debug!(address = %self.address, "Consumer dropped");
        }
    }
}

/// Cloneable cancellation handle for a [`MessageConsumer`].
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    address: String,
    id: u64,
    registry: Weak<ConsumerRegistry>,
}

impl ConsumerHandle {
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Unregister the consumer. Idempotent.
    ///
    /// Messages already buffered are still returned by `recv`, after which
    /// it yields `None`.
    pub fn cancel(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.remove(&self.address, self.id);
        if removed {
            debug!(address = %self.address, "Consumer cancelled");
        }
        removed
    }

    /// Whether the consumer is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(&self.address, self.id))
    }
}
