//! Message types for the fourline wire format.
//!
//! Every frame is a JSON object with a `type` tag. Client intents carry
//! their fields inline:
//!
//! ```json
//! { "type": "join", "username": "alice" }
//! { "type": "move", "column": 3 }
//! ```
//!
//! Server notifications put their fields under `data`, in camelCase:
//!
//! ```json
//! { "type": "game_start", "data": { "gameId": "…", "player1": "alice",
//!   "player2": "bob", "yourTurn": true } }
//! ```

use std::fmt;

use fourline_engine::{Board, Move, Side};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of `game_over.winner` when the game ended in a draw.
pub const DRAW_MARKER: &str = "draw";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque, globally unique game identifier.
///
/// Serialized as the plain UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub Uuid);

impl GameId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Shared payload types
// ---------------------------------------------------------------------------

/// Why a game ended other than by four in a row or a full board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The loser's connection dropped and did not come back within the
    /// reconnection grace period.
    OpponentDisconnected,
}

/// Aggregate results for one player, as returned by leaderboard reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub username: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl PlayerStats {
    /// A zeroed record for `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            wins: 0,
            losses: 0,
            draws: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Intents a client can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Claim a display name and ask for an opponent. Also resumes a game
    /// left behind by a dropped connection with the same name.
    Join {
        #[serde(alias = "displayName")]
        username: String,
    },

    /// Drop a piece. Signed so that out-of-range values reach the board
    /// and come back as an `invalid column` error instead of being
    /// silently discarded as undecodable.
    Move { column: i64 },

    /// Ask for the top of the leaderboard.
    Leaderboard {
        #[serde(default)]
        limit: Option<usize>,
    },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Notifications the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Join acknowledged, the player is in the matchmaking queue.
    Waiting { message: String },

    /// A game was created. `your_turn` is true for player 1.
    GameStart {
        game_id: GameId,
        player1: String,
        player2: String,
        your_turn: bool,
    },

    /// A piece was placed, by either participant.
    Move(Move),

    /// The game is over. `winner` is a display name or [`DRAW_MARKER`].
    GameOver {
        winner: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<EndReason>,
    },

    /// The connection took over an identity whose game was still running.
    Reconnected {
        game_id: GameId,
        player1: String,
        player2: String,
        board: Board,
        turn: Side,
        your_turn: bool,
    },

    /// Reply to a leaderboard request, ordered by wins descending.
    Leaderboard { players: Vec<PlayerStats> },

    /// A request from this connection was rejected.
    Error { message: String },
}

impl ServerMessage {
    /// Shorthand for an [`ServerMessage::Error`] built from any error.
    pub fn error(err: impl fmt::Display) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
