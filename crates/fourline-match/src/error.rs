//! Error types for the matchmaking layer.

use fourline_transport::ConnectionId;

/// Errors that can occur when joining the waiting queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// The connection already has an entry in the queue.
    #[error("{0} is already waiting for an opponent")]
    AlreadyQueued(ConnectionId),

    /// The name belongs to the automated opponent.
    #[error("name {0:?} is reserved")]
    ReservedName(String),
}
