//! Matchmaker configuration.

use std::time::Duration;

/// Settings for the waiting queue.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// How long a player waits for a human opponent before being paired
    /// with the automated one.
    ///
    /// Default: 10 seconds.
    pub bot_fallback_after: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            bot_fallback_after: Duration::from_secs(10),
        }
    }
}

impl MatchConfig {
    pub fn with_bot_fallback_after(mut self, after: Duration) -> Self {
        self.bot_fallback_after = after;
        self
    }
}
