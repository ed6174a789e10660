//! Wildcard patterns for group criteria
//!
//! `*` stands for one or more characters. Everything else is literal, the
//! match is anchored at both ends, and case is ignored.

use crate::errors::{DepsError, DepsResult};
use regex::{Regex, RegexBuilder};

/// Compiled regex size cap; patterns beyond it are rejected as malformed
const SIZE_LIMIT: usize = 1 << 16;

#[derive(Debug, Clone)]
pub struct WildcardPattern {
    raw: String,
    regex: Regex,
}

impl WildcardPattern {
    pub fn compile(pattern: &str) -> DepsResult<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(DepsError::malformed(pattern, "empty pattern"));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(DepsError::malformed(pattern, "control character in pattern"));
        }

        let body = trimmed
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".+");
        let regex = RegexBuilder::new(&format!("^{body}$"))
            .case_insensitive(true)
            .size_limit(SIZE_LIMIT)
            .build()
            .map_err(|e| DepsError::malformed(pattern, e.to_string()))?;

        Ok(Self {
            raw: trimmed.to_string(),
            regex,
        })
    }

    /// Empty values never match
    pub fn matches(&self, value: &str) -> bool {
        !value.is_empty() && self.regex.is_match(value)
    }

    pub fn has_wildcard(&self) -> bool {
        self.raw.contains('*')
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}
