//! # Node Configuration
//!
//! Listener, bridge rules and identities, read from one JSON document.
//! `BRIDGE_HOST` / `BRIDGE_PORT` override the bind address after loading.

use eventbus_bridge::{BridgeOptions, ConfigError, IdentityEntry, ServiceConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeConfig {
    /// HTTP/WebSocket listener.
    pub server: ServiceConfig,
    /// Permission rules and limits.
    pub bridge: BridgeOptions,
    /// Bearer tokens accepted by the listener.
    pub identities: Vec<IdentityEntry>,
}

impl NodeConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.server.validate()?;
        config.bridge.validate()?;
        Ok(config)
    }

    /// Read the file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Apply `BRIDGE_HOST` / `BRIDGE_PORT`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("BRIDGE_HOST") {
            self.server.host = host
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("BRIDGE_HOST: {host}")))?;
        }
        if let Some(port) = lookup("BRIDGE_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("BRIDGE_PORT: {port}")))?;
        }
        Ok(())
    }
}

/// Configuration file named by `BRIDGE_CONFIG`, else the first argument.
pub fn config_path(
    lookup: impl Fn(&str) -> Option<String>,
    mut args: impl Iterator<Item = String>,
) -> Option<PathBuf> {
    lookup("BRIDGE_CONFIG")
        .or_else(|| args.nth(1))
        .map(PathBuf::from)
}

/// Load from the environment and command line, defaulting when no file is named.
pub fn load() -> Result<NodeConfig, ConfigError> {
    let lookup = |key: &str| std::env::var(key).ok();
    let mut config = match config_path(lookup, std::env::args()) {
        Some(path) => NodeConfig::from_file(&path)?,
        None => NodeConfig::default(),
    };
    config.apply_overrides(lookup)?;
    Ok(config)
}
