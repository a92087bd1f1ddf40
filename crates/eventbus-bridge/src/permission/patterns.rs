//! Compiled address pattern cache.
//!
//! Patterns are compiled lazily, keyed by pattern text, and shared by every
//! socket. Concurrent first use of the same pattern may compile it twice; the
//! first entry inserted wins and all callers get that one.

use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use tracing::warn;

/// Compile `pattern` so it must match the whole address.
pub fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Shared cache of compiled address patterns.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: DashMap<String, Arc<Regex>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached regex for `pattern`, compiling it on first use.
    pub fn get_or_compile(&self, pattern: &str) -> Result<Arc<Regex>, regex::Error> {
        if let Some(regex) = self.compiled.get(pattern) {
            return Ok(Arc::clone(regex.value()));
        }

        let regex = Arc::new(compile(pattern)?);
        let entry = self.compiled.entry(pattern.to_string()).or_insert(regex);
        Ok(Arc::clone(entry.value()))
    }

    /// Whether `address` fully matches `pattern`. Uncompilable patterns
    /// never match.
    pub fn is_match(&self, pattern: &str, address: &str) -> bool {
        match self.get_or_compile(pattern) {
            Ok(regex) => regex.is_match(address),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Address pattern does not compile");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
