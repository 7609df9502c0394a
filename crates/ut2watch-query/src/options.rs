//! Per-query options.

use std::time::Duration;

/// Timeout used when the caller does not set one.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Which sections to request, and how long the whole exchange may take.
///
/// Server info is always requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub rules: bool,
    pub players: bool,
    pub timeout: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            rules: false,
            players: false,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(mut self) -> Self {
        self.rules = true;
        self
    }

    pub fn with_players(mut self) -> Self {
        self.players = true;
        self
    }

    /// A zero timeout falls back to the default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() {
            DEFAULT_QUERY_TIMEOUT
        } else {
            timeout
        };
        self
    }
}
