//! Unified error type for the fourline server.

use fourline_match::MatchError;
use fourline_protocol::ProtocolError;
use fourline_session::RegistryError;
use fourline_transport::TransportError;

use crate::config::ConfigError;
use crate::hub::HubError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum FourlineError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A game registry error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A matchmaking error.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// A rejected player intent.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
