//! Registration Table.
//!
//! Per-socket handler accounting. Slots are taken by registrations and by
//! outstanding replies; the count never exceeds the configured maximum.

use shared_bus::ConsumerHandle;
use std::collections::HashMap;
use tokio::task::AbortHandle;
use tracing::debug;

/// Active bus consumer created by a client `register`.
#[derive(Debug)]
pub struct Registration {
    consumer: ConsumerHandle,
    forwarder: AbortHandle,
}

impl Registration {
    pub fn new(consumer: ConsumerHandle, forwarder: AbortHandle) -> Self {
        Self {
            consumer,
            forwarder,
        }
    }

    /// Remove the consumer from the bus and stop relaying.
    pub fn cancel(self) {
        self.consumer.cancel();
        self.forwarder.abort();
    }
}

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("handler limit reached")]
    Full,
    #[error("address already registered")]
    AlreadyRegistered,
}

/// Handler slots and address -> consumer map for one socket.
#[derive(Debug)]
pub struct RegistrationTable {
    max_handlers: usize,
    handler_count: usize,
    registrations: HashMap<String, Registration>,
}

impl RegistrationTable {
    pub fn new(max_handlers: usize) -> Self {
        Self {
            max_handlers,
            handler_count: 0,
            registrations: HashMap::new(),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handler_count
    }

    pub fn has_capacity(&self) -> bool {
        self.handler_count < self.max_handlers
    }

    pub fn is_registered(&self, address: &str) -> bool {
        self.registrations.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Take a slot for an outstanding reply.
    pub fn reserve_slot(&mut self) -> bool {
        if !self.has_capacity() {
            return false;
        }
        self.handler_count += 1;
        true
    }

    pub fn release_slot(&mut self) {
        self.handler_count = self.handler_count.saturating_sub(1);
    }

    /// Whether `address` could be registered right now.
    pub fn check(&self, address: &str) -> Result<(), RegisterError> {
        if self.is_registered(address) {
            return Err(RegisterError::AlreadyRegistered);
        }
        if !self.has_capacity() {
            return Err(RegisterError::Full);
        }
        Ok(())
    }

    /// Record a registration, taking one slot. A refused registration is
    /// cancelled before returning.
    pub fn register(
        &mut self,
        address: String,
        registration: Registration,
    ) -> Result<(), RegisterError> {
        if let Err(e) = self.check(&address) {
            registration.cancel();
            return Err(e);
        }
        self.handler_count += 1;
        self.registrations.insert(address, registration);
        Ok(())
    }

    /// Cancel the registration for `address`. No-op if absent.
    pub fn unregister(&mut self, address: &str) -> bool {
        match self.registrations.remove(address) {
            Some(registration) => {
                registration.cancel();
                self.release_slot();
                true
            }
            None => {
                debug!(address = %address, "Unregister for unknown address ignored");
                false
            }
        }
    }

    /// Drain every registration for cancellation by the caller.
    pub fn close_all(&mut self) -> Vec<(String, Registration)> {
        let drained: Vec<_> = self.registrations.drain().collect();
        self.handler_count = self.handler_count.saturating_sub(drained.len());
        drained
    }
}
