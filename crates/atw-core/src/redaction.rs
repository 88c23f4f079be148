//! Attribute redaction for rendered payloads.

use crate::matcher::pattern_matches;
use serde::{Deserialize, Serialize};

/// Text substituted for redacted placeholders.
pub const REDACTED: &str = "[REDACTED]";

/// Set of attribute key patterns whose values must never leave the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionPolicy {
    enabled: bool,
    patterns: Vec<String>,
}

impl RedactionPolicy {
    pub fn new(enabled: bool, patterns: Vec<String>) -> Self {
        Self { enabled, patterns }
    }

    /// A policy that redacts nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_redacted(&self, field: &str) -> bool {
        self.enabled
            && self
                .patterns
                .iter()
                .any(|pattern| pattern_matches(pattern, field))
    }
}
