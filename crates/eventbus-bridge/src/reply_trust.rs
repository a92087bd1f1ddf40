//! Reply-Trust Tracker.
//!
//! Bridge-wide set of reply addresses a client may send to once without
//! passing inbound rules. Every grant schedules its own expiry; the first
//! inbound use removes the entry and cancels that expiry.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

struct Grant {
    /// Distinguishes re-grants so a stale timer cannot evict a newer entry
    generation: u64,
    expiry: AbortHandle,
}

/// Statistics for the tracker
#[derive(Debug, Default)]
pub struct TrustStats {
    pub granted: AtomicU64,
    pub consumed: AtomicU64,
    pub expired: AtomicU64,
}

/// Temporary, single-use allow-list of reply addresses.
pub struct ReplyTrustTracker {
    entries: Arc<DashMap<String, Grant>>,
    timeout: Duration,
    next_generation: AtomicU64,
    stats: Arc<TrustStats>,
}

impl ReplyTrustTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            timeout,
            next_generation: AtomicU64::new(0),
            stats: Arc::new(TrustStats::default()),
        }
    }

    /// Trust `address` until it is used or the timeout passes.
    ///
    /// Re-granting a member restarts its timeout. Empty addresses are
    /// ignored. Must be called inside a Tokio runtime.
    pub fn grant(&self, address: &str) -> bool {
        if address.is_empty() {
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let expiry = {
            let entries = Arc::clone(&self.entries);
            let stats = Arc::clone(&self.stats);
            let key = address.to_string();
            let timeout = self.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if entries
                    .remove_if(&key, |_, grant| grant.generation == generation)
                    .is_some()
                {
                    stats.expired.fetch_add(1, Ordering::Relaxed);
                    debug!(address = %key, "Reply trust expired");
                }
            })
            .abort_handle()
        };

        if let Some(previous) = self
            .entries
            .insert(address.to_string(), Grant { generation, expiry })
        {
            previous.expiry.abort();
        }
        self.stats.granted.fetch_add(1, Ordering::Relaxed);
        debug!(address = %address, "Reply trust granted");
        true
    }

    /// Test-and-remove. Returns whether `address` was trusted.
    pub fn consume(&self, address: &str) -> bool {
        match self.entries.remove(address) {
            Some((_, grant)) => {
                grant.expiry.abort();
                self.stats.consumed.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn stats(&self) -> &TrustStats {
        &self.stats
    }
}

impl Drop for ReplyTrustTracker {
    fn drop(&mut self) {
        for entry in self.entries.iter() {
            entry.value().expiry.abort();
        }
    }
}
