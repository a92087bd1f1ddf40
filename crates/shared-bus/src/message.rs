//! Message, delivery option and reply failure types carried by the bus.

use crate::{DEFAULT_REPLY_TIMEOUT, NO_FAILURE_CODE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// String-to-string message headers.
pub type Headers = BTreeMap<String, String>;

/// A message routed by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMessage {
    /// Address the message was sent to.
    pub address: String,
    /// JSON payload.
    pub body: Value,
    /// Headers supplied by the sender.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,
    /// Correlation address to reply to, when the sender awaits a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_address: Option<String>,
}

impl BusMessage {
    pub fn new(address: impl Into<String>, body: Value) -> Self {
        Self {
            address: address.into(),
            body,
            headers: Headers::new(),
            reply_address: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_reply_address(mut self, reply_address: impl Into<String>) -> Self {
        self.reply_address = Some(reply_address.into());
        self
    }
}

/// Per-delivery options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// How long a `request` waits for its reply.
    pub timeout: Duration,
    /// Headers attached to the outgoing message.
    pub headers: Headers,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REPLY_TIMEOUT,
            headers: Headers::new(),
        }
    }
}

impl DeliveryOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// Why a request did not receive a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    Timeout,
    NoHandlers,
    RecipientFailure,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::NoHandlers => "NO_HANDLERS",
            Self::RecipientFailure => "RECIPIENT_FAILURE",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{failure_type} ({failure_code}): {message}")]
pub struct ReplyFailure {
    pub failure_code: i32,
    pub failure_type: FailureType,
    pub message: String,
}

impl ReplyFailure {
    pub fn timeout(address: &str, after: Duration) -> Self {
        Self {
            failure_code: NO_FAILURE_CODE,
            failure_type: FailureType::Timeout,
            message: format!(
                "Timed out after waiting {}(ms) for a reply. address: {address}",
                after.as_millis()
            ),
        }
    }

    pub fn no_handlers(address: &str) -> Self {
        Self {
            failure_code: NO_FAILURE_CODE,
            failure_type: FailureType::NoHandlers,
            message: format!("No handlers for address {address}"),
        }
    }

    /// Explicit failure returned by the consumer that handled the request.
    pub fn recipient(failure_code: i32, message: impl Into<String>) -> Self {
        Self {
            failure_code,
            failure_type: FailureType::RecipientFailure,
            message: message.into(),
        }
    }
}
