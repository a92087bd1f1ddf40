//! Bridge error types.
//!
//! [`ErrorCode`] is the closed set of codes written to clients in
//! `{"type":"err","body":<code>}` frames. The remaining types are internal
//! errors surfaced to the embedding application.

use crate::domain::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame is not a JSON object
    InvalidJson,
    /// Frame has no `type`
    MissingType,
    /// Frame has no `address` (all kinds except `ping`)
    MissingAddress,
    /// Unknown `type`
    InvalidType,
    /// Socket is at its handler limit
    MaxHandlersReached,
    /// Address longer than the configured maximum
    MaxAddressLengthReached,
    /// No rule permits the action, or the capability check said no
    AccessDenied,
    /// Rule requires a capability and the socket has no identity
    NoSession,
    /// Rule requires a capability and the identity is not authenticated
    NotLoggedIn,
    /// The identity oracle failed
    AuthError,
    /// Reply address longer than a correlation address
    InvalidReplyAddress,
    /// Address already registered on this socket
    AddressAlreadyRegistered,
    /// Refused by the bridge hook
    Rejected,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 13] = [
        Self::InvalidJson,
        Self::MissingType,
        Self::MissingAddress,
        Self::InvalidType,
        Self::MaxHandlersReached,
        Self::MaxAddressLengthReached,
        Self::AccessDenied,
        Self::NoSession,
        Self::NotLoggedIn,
        Self::AuthError,
        Self::InvalidReplyAddress,
        Self::AddressAlreadyRegistered,
        Self::Rejected,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::MissingType => "missing_type",
            Self::MissingAddress => "missing_address",
            Self::InvalidType => "invalid_type",
            Self::MaxHandlersReached => "max_handlers_reached",
            Self::MaxAddressLengthReached => "max_address_length_reached",
            Self::AccessDenied => "access_denied",
            Self::NoSession => "no_session",
            Self::NotLoggedIn => "not_logged_in",
            Self::AuthError => "auth_error",
            Self::InvalidReplyAddress => "invalid_reply_address",
            Self::AddressAlreadyRegistered => "address_already_registered",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the identity oracle while answering a capability check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Backing store could not be reached
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    /// Lookup ran but failed
    #[error("authorization lookup failed: {0}")]
    Lookup(String),
}

/// Bridge-level errors (not sent to clients)
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// HTTP server failed while running
    #[error("server error: {0}")]
    Server(String),
}
