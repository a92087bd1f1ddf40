//! # Shared Bus - Address-Based Message Bus
//!
//! In-process bus that routes JSON messages by string address.
//!
//! ## Delivery Modes
//!
//! ```text
//! send(addr)     ──► one consumer on addr (round robin)
//! request(addr)  ──► one consumer on addr, awaits a reply on a
//!                    generated correlation address
//! publish(addr)  ──► every consumer on addr
//! ```
//!
//! A consumer is registered with [`EventBus::consume`] and stays registered
//! until its [`MessageConsumer`] is dropped or a [`ConsumerHandle`] cancels it.
//!
//! Replies travel over the same routing: any `send` or `request` addressed to
//! a pending correlation address completes the request waiting on it, so a
//! reply can itself ask for a reply.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod message;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use message::{BusMessage, DeliveryOptions, FailureType, Headers, ReplyFailure};
pub use publisher::{BusStats, EventBus, InMemoryEventBus};
pub use subscriber::{ConsumerError, ConsumerHandle, MessageConsumer};

use std::time::Duration;

/// Maximum messages to buffer per consumer before delivery is refused.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Reply timeout used when [`DeliveryOptions`] does not set one.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Length of generated correlation (reply) addresses: a hyphenated UUID.
pub const CORRELATION_ADDRESS_LENGTH: usize = 36;

/// Failure code reported for timeouts and missing handlers.
pub const NO_FAILURE_CODE: i32 = -1;
