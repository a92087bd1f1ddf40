//! Identity oracle port.
//!
//! A socket may carry an identity. Capability checks are asynchronous so an
//! implementation can consult a remote store.

use crate::domain::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Caller identity attached to a socket.
#[async_trait]
pub trait Identity: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn is_authenticated(&self) -> bool;

    async fn has_permission(&self, permission: &str) -> Result<bool, AuthError>;

    async fn has_role(&self, role: &str) -> Result<bool, AuthError>;
}

/// Identity with a fixed set of roles and permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticIdentity {
    name: String,
    authenticated: bool,
    roles: HashSet<String>,
    permissions: HashSet<String>,
}

impl StaticIdentity {
    pub fn authenticated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authenticated: true,
            ..Self::default()
        }
    }

    /// Identity that is present but not logged in.
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

#[async_trait]
impl Identity for StaticIdentity {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn has_permission(&self, permission: &str) -> Result<bool, AuthError> {
        Ok(self.permissions.contains(permission))
    }

    async fn has_role(&self, role: &str) -> Result<bool, AuthError> {
        Ok(self.roles.contains(role))
    }
}

/// Resolves the identity of a connecting client from its credential.
pub trait IdentityProvider: Send + Sync {
    /// `None` means the socket has no identity at all.
    fn resolve(&self, token: Option<&str>) -> Option<Arc<dyn Identity>>;
}

/// Configured identity for [`TokenIdentityProvider`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdentityEntry {
    pub token: String,
    pub name: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Bearer-token lookup table.
///
/// No token resolves to no identity; an unknown token resolves to an
/// unauthenticated identity.
#[derive(Debug, Default)]
pub struct TokenIdentityProvider {
    identities: HashMap<String, Arc<StaticIdentity>>,
}

impl TokenIdentityProvider {
    pub fn new(entries: impl IntoIterator<Item = IdentityEntry>) -> Self {
        let identities = entries
            .into_iter()
            .map(|entry| {
                let identity = entry
                    .roles
                    .into_iter()
                    .fold(StaticIdentity::authenticated(entry.name), |id, role| {
                        id.with_role(role)
                    });
                let identity = entry
                    .permissions
                    .into_iter()
                    .fold(identity, |id, permission| id.with_permission(permission));
                (entry.token, Arc::new(identity))
            })
            .collect();
        Self { identities }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl IdentityProvider for TokenIdentityProvider {
    fn resolve(&self, token: Option<&str>) -> Option<Arc<dyn Identity>> {
        let token = token?;
        match self.identities.get(token) {
            Some(identity) => {
                debug!(identity = %identity.name(), "Token resolved");
                Some(Arc::clone(identity) as Arc<dyn Identity>)
            }
            None => {
                debug!("Unknown token, treating caller as not logged in");
                Some(Arc::new(StaticIdentity::anonymous()))
            }
        }
    }
}
