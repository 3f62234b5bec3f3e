//! Error types for the session layer.

use fourline_engine::BoardError;
use fourline_protocol::GameId;

/// Errors raised while reading or mutating a game.
///
/// Everything except `NotFound` is a caller-input error: the game is left
/// exactly as it was and the message goes back to the player who asked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No game with this id is held by the registry. Usually the game was
    /// removed between the caller's lookup and its update.
    #[error("game {0} not found")]
    NotFound(GameId),

    /// The game already has a result; nothing can change it any more.
    #[error("Game is already finished")]
    AlreadyFinished(GameId),

    /// The mover's side is not the side to move.
    #[error("Not your turn")]
    NotYourTurn,

    /// The board rejected the column.
    #[error(transparent)]
    Board(#[from] BoardError),
}
