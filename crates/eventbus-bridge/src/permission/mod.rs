//! Permission Matcher.
//!
//! Rules are evaluated first-match over an ordered list: the first rule whose
//! address condition and structural predicate both hold decides the outcome,
//! including any role/permission it requires. No match rejects.

pub mod matcher;
pub mod patterns;
pub mod structure;

pub use matcher::{evaluate_rules, PermissionMatcher};
pub use patterns::PatternCache;
pub use structure::structure_matches;

use crate::domain::error::AuthError;
use crate::ports::identity::Identity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Traffic direction a rule list applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client -> bus
    Inbound,
    /// Bus -> client
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

/// Capability requirement carried by a matched rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirement {
    pub role: Option<String>,
    pub permission: Option<String>,
}

impl Requirement {
    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.permission.is_none()
    }

    /// Ask the identity oracle. Both the permission and the role must hold
    /// when a rule names both.
    pub async fn check(&self, identity: &dyn Identity) -> Result<bool, AuthError> {
        if let Some(permission) = &self.permission {
            if !identity.has_permission(permission).await? {
                return Ok(false);
            }
        }
        if let Some(role) = &self.role {
            if !identity.has_role(role).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Outcome of evaluating a rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    Rejected,
    Accepted(Requirement),
}

impl Match {
    /// Accepted with no capability requirement.
    pub fn unconditional() -> Self {
        Self::Accepted(Requirement::default())
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}
