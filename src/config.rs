//! Analysis configuration.

use std::time::Duration;

/// Limits for caret resolution and snapshot waits.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    /// Turns the caret-boundary retry may take before giving up.
    pub recursion_limit: usize,
    /// Tokens inspected backwards from a string literal for `include`,
    /// `require`, `define` or `constant`.
    pub string_lookback: usize,
    /// How long a request waits for a snapshot that is still being built.
    pub parse_timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 100,
            string_lookback: 4,
            parse_timeout: Duration::from_millis(300),
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_string_lookback(mut self, tokens: usize) -> Self {
        self.string_lookback = tokens;
        self
    }

    pub fn with_parse_timeout(mut self, timeout: Duration) -> Self {
        self.parse_timeout = timeout;
        self
    }
}
