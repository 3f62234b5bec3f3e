//! Server and hub configuration.
//!
//! Everything has a working default; [`ServerConfig::from_env`] overrides
//! individual values from environment variables for the binary.

use std::time::Duration;

use fourline_match::MatchConfig;
use fourline_transport::DEFAULT_MAX_MESSAGE_BYTES;

/// Errors while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// HubConfig
// ---------------------------------------------------------------------------

/// Timing and sizing for the connection hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// How long a joined player waits for a human opponent before the
    /// automated one takes the seat.
    ///
    /// Default: 10 seconds.
    pub matchmaking_timeout: Duration,

    /// How long a player who dropped mid-game has to come back before the
    /// game is forfeited to their opponent.
    ///
    /// Default: 30 seconds.
    pub reconnect_grace: Duration,

    /// Per-connection outbound queue size. A recipient whose queue is full
    /// is treated as lost.
    ///
    /// Default: 256.
    pub outbound_capacity: usize,

    /// Rows returned for a leaderboard request that does not ask for a
    /// specific number.
    ///
    /// Default: 10.
    pub leaderboard_limit: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            matchmaking_timeout: Duration::from_secs(10),
            reconnect_grace: Duration::from_secs(30),
            outbound_capacity: 256,
            leaderboard_limit: 10,
        }
    }
}

impl HubConfig {
    pub fn with_matchmaking_timeout(mut self, timeout: Duration) -> Self {
        self.matchmaking_timeout = timeout;
        self
    }

    pub fn with_reconnect_grace(mut self, grace: Duration) -> Self {
        self.reconnect_grace = grace;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    pub fn with_leaderboard_limit(mut self, limit: usize) -> Self {
        self.leaderboard_limit = limit;
        self
    }

    pub(crate) fn match_config(&self) -> MatchConfig {
        MatchConfig::default().with_bot_fallback_after(self.matchmaking_timeout)
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Top-level configuration for [`FourlineServer`](crate::FourlineServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    ///
    /// Default: `0.0.0.0:8080`.
    pub bind_addr: String,

    /// Close a connection that sends nothing for this long. `None` keeps
    /// idle connections open.
    pub idle_timeout: Option<Duration>,

    /// Largest single client message; a bigger one ends the connection.
    ///
    /// Default: 64 KiB.
    pub max_message_bytes: usize,

    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            idle_timeout: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by the process environment:
    ///
    /// | variable                         | field                        |
    /// |----------------------------------|------------------------------|
    /// | `FOURLINE_ADDR`                  | `bind_addr`                  |
    /// | `PORT`                           | port of `bind_addr`, if `FOURLINE_ADDR` is unset |
    /// | `FOURLINE_MATCH_TIMEOUT_SECS`    | `hub.matchmaking_timeout`    |
    /// | `FOURLINE_RECONNECT_GRACE_SECS`  | `hub.reconnect_grace`        |
    /// | `FOURLINE_IDLE_TIMEOUT_SECS`     | `idle_timeout`               |
    /// | `FOURLINE_MAX_MESSAGE_BYTES`     | `max_message_bytes`          |
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] for a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("FOURLINE_ADDR") {
            config.bind_addr = addr;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = parse("PORT", &port)?;
            config.bind_addr = format!("0.0.0.0:{port}");
        }

        if let Some(value) = lookup("FOURLINE_MATCH_TIMEOUT_SECS") {
            config.hub.matchmaking_timeout =
                Duration::from_secs(parse("FOURLINE_MATCH_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = lookup("FOURLINE_RECONNECT_GRACE_SECS") {
            config.hub.reconnect_grace = Duration::from_secs(parse(
                "FOURLINE_RECONNECT_GRACE_SECS",
                &value,
            )?);
        }
        if let Some(value) = lookup("FOURLINE_IDLE_TIMEOUT_SECS") {
            let secs: u64 = parse("FOURLINE_IDLE_TIMEOUT_SECS", &value)?;
            config.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(value) = lookup("FOURLINE_MAX_MESSAGE_BYTES") {
            config.max_message_bytes = parse("FOURLINE_MAX_MESSAGE_BYTES", &value)?;
        }

        Ok(config)
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
