//! Bridge configuration with validation.
//!
//! All documents use camelCase keys. Durations are written either as integer
//! milliseconds or as strings with an `ms`, `s` or `m` suffix.

use crate::permission::{patterns, Direction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default maximum address length for `register`
pub const DEFAULT_MAX_ADDRESS_LENGTH: usize = 200;

/// Default number of handler slots per socket
pub const DEFAULT_MAX_HANDLERS_PER_SOCKET: usize = 1000;

/// Default ping timeout
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Default reply timeout
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Bridge configuration. Loaded once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeOptions {
    /// Rules for client -> bus traffic, first match wins
    pub inbound_permitted: Vec<PermittedOptions>,
    /// Rules for bus -> client traffic, first match wins
    pub outbound_permitted: Vec<PermittedOptions>,
    pub max_address_length: usize,
    pub max_handlers_per_socket: usize,
    /// Idle sockets are closed once this elapses without a ping
    #[serde(with = "duration_ms")]
    pub ping_timeout: Duration,
    /// How long replies are awaited and reply addresses stay trusted
    #[serde(with = "duration_ms")]
    pub reply_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            inbound_permitted: Vec::new(),
            outbound_permitted: Vec::new(),
            max_address_length: DEFAULT_MAX_ADDRESS_LENGTH,
            max_handlers_per_socket: DEFAULT_MAX_HANDLERS_PER_SOCKET,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl BridgeOptions {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    #[must_use]
    pub fn add_inbound_permitted(mut self, rule: PermittedOptions) -> Self {
        self.inbound_permitted.push(rule);
        self
    }

    #[must_use]
    pub fn add_outbound_permitted(mut self, rule: PermittedOptions) -> Self {
        self.outbound_permitted.push(rule);
        self
    }

    #[must_use]
    pub fn with_max_address_length(mut self, max: usize) -> Self {
        self.max_address_length = max;
        self
    }

    #[must_use]
    pub fn with_max_handlers_per_socket(mut self, max: usize) -> Self {
        self.max_handlers_per_socket = max;
        self
    }

    #[must_use]
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Rules for one direction.
    pub fn rules(&self, direction: Direction) -> &[PermittedOptions] {
        match direction {
            Direction::Inbound => &self.inbound_permitted,
            Direction::Outbound => &self.outbound_permitted,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_address_length == 0 {
            return Err(ConfigError::InvalidLimit(
                "maxAddressLength cannot be 0".into(),
            ));
        }

        if self.ping_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("pingTimeout cannot be 0".into()));
        }

        if self.reply_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "replyTimeout cannot be 0".into(),
            ));
        }

        for direction in [Direction::Inbound, Direction::Outbound] {
            for (index, rule) in self.rules(direction).iter().enumerate() {
                rule.validate(direction, index)?;
            }
        }

        Ok(())
    }
}

/// One permission rule.
///
/// The address condition is the literal `address` when set, otherwise the
/// `addressRegex` full match, otherwise unconditional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PermittedOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, alias = "address_re", skip_serializing_if = "Option::is_none")]
    pub address_regex: Option<String>,

    /// Partial document the body must contain
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub structure: Option<Value>,

    #[serde(default, alias = "required_role", skip_serializing_if = "Option::is_none")]
    pub required_role: Option<String>,

    #[serde(
        default,
        alias = "required_permission",
        skip_serializing_if = "Option::is_none"
    )]
    pub required_permission: Option<String>,
}

impl PermittedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn address_regex(mut self, pattern: impl Into<String>) -> Self {
        self.address_regex = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn matching(mut self, structure: Value) -> Self {
        self.structure = Some(structure);
        self
    }

    #[must_use]
    pub fn required_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    #[must_use]
    pub fn required_permission(mut self, permission: impl Into<String>) -> Self {
        self.required_permission = Some(permission.into());
        self
    }

    fn validate(&self, direction: Direction, index: usize) -> Result<(), ConfigError> {
        if let Some(structure) = &self.structure {
            if !(structure.is_object() || structure.is_null()) {
                return Err(ConfigError::InvalidMatch { direction, index });
            }
        }

        // A literal address shadows the pattern, but a broken pattern is
        // still a configuration mistake.
        if let Some(pattern) = &self.address_regex {
            patterns::compile(pattern).map_err(|e| ConfigError::InvalidPattern {
                direction,
                index,
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

/// HTTP/WebSocket listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080, 0 = ephemeral)
    pub port: u16,
    /// WebSocket route
    pub path: String,
    /// Largest accepted frame in bytes
    pub max_message_size: usize,
    /// Outbound frames buffered per socket before new ones are dropped
    pub send_queue: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            path: "/eventbus".to_string(),
            max_message_size: 64 * 1024,
            send_queue: 256,
        }
    }
}

impl ServiceConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "path must start with '/': {}",
                self.path
            )));
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "maxMessageSize cannot be 0".into(),
            ));
        }

        if self.send_queue == 0 {
            return Err(ConfigError::InvalidLimit("sendQueue cannot be 0".into()));
        }

        Ok(())
    }

    /// Get server bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Document could not be deserialized (includes unknown rule fields)
    #[error("invalid configuration document: {0}")]
    Parse(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// `match` is not a JSON object
    #[error("{direction} rule {index}: match must be a JSON object")]
    InvalidMatch { direction: Direction, index: usize },
    /// `addressRegex` does not compile
    #[error("{direction} rule {index}: invalid address pattern `{pattern}`: {reason}")]
    InvalidPattern {
        direction: Direction,
        index: usize,
        pattern: String,
        reason: String,
    },
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde module for durations as milliseconds or suffixed strings
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            // Plain numbers are milliseconds, same as the integer form
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid duration format")
        }
    }
}
