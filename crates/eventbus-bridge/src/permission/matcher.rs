//! Rule evaluation with the reply-trust shortcut for inbound traffic.

use crate::domain::config::{BridgeOptions, PermittedOptions};
use crate::permission::patterns::PatternCache;
use crate::permission::structure::structure_matches;
use crate::permission::{Direction, Match, Requirement};
use crate::reply_trust::ReplyTrustTracker;
use serde_json::Value;
use std::sync::Arc;

/// Evaluate `rules` in order against `address` and `body`.
pub fn evaluate_rules(
    rules: &[PermittedOptions],
    patterns: &PatternCache,
    address: &str,
    body: Option<&Value>,
) -> Match {
    rules
        .iter()
        .find(|rule| {
            address_matches(rule, patterns, address)
                && structure_matches(rule.structure.as_ref(), body)
        })
        .map_or(Match::Rejected, |rule| {
            Match::Accepted(Requirement {
                role: rule.required_role.clone(),
                permission: rule.required_permission.clone(),
            })
        })
}

fn address_matches(rule: &PermittedOptions, patterns: &PatternCache, address: &str) -> bool {
    match (&rule.address, &rule.address_regex) {
        (Some(literal), _) => literal == address,
        (None, Some(pattern)) => patterns.is_match(pattern, address),
        (None, None) => true,
    }
}

/// Inbound and outbound rule lists plus the shared state they consult.
pub struct PermissionMatcher {
    inbound: Vec<PermittedOptions>,
    outbound: Vec<PermittedOptions>,
    patterns: Arc<PatternCache>,
    trust: Arc<ReplyTrustTracker>,
}

impl PermissionMatcher {
    pub fn new(
        options: &BridgeOptions,
        patterns: Arc<PatternCache>,
        trust: Arc<ReplyTrustTracker>,
    ) -> Self {
        Self {
            inbound: options.inbound_permitted.clone(),
            outbound: options.outbound_permitted.clone(),
            patterns,
            trust,
        }
    }

    /// Rule evaluation only; never touches reply trust.
    pub fn evaluate(&self, direction: Direction, address: &str, body: Option<&Value>) -> Match {
        let rules = match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        };
        evaluate_rules(rules, &self.patterns, address, body)
    }

    /// Inbound check for `send`/`publish`. A trusted reply address is
    /// accepted unconditionally and its trust is used up.
    pub fn check_inbound(&self, address: &str, body: Option<&Value>) -> Match {
        if self.trust.consume(address) {
            return Match::unconditional();
        }
        self.evaluate(Direction::Inbound, address, body)
    }

    pub fn patterns(&self) -> &PatternCache {
        &self.patterns
    }
}
