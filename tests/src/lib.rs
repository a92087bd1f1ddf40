//! # Event Bus Bridge Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── bridge_benchmarks.rs   # Rule matching and structural match cost
//! └── src/integration/
//!     ├── harness.rs             # In-memory client sockets over a bridge
//!     ├── flows.rs               # End-to-end bridge scenarios
//!     └── websocket.rs           # Real WebSocket round trips
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p bridge-tests
//!
//! # By category
//! cargo test -p bridge-tests integration::flows::
//! cargo test -p bridge-tests integration::websocket::
//!
//! # Benchmarks
//! cargo bench -p bridge-tests
//! ```

#![allow(dead_code)]

pub mod integration;
