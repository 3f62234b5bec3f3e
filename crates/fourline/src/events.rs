//! Game lifecycle notifications for an external event log.
//!
//! Publishing is fire-and-forget: the hub spawns each publish after the
//! game lock is released and only logs a failure.

use std::future::Future;

use fourline_engine::Move;
use fourline_protocol::{EndReason, GameId};
use serde::Serialize;

/// Errors reported by an event log.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("event log unavailable: {0}")]
    Unavailable(String),

    #[error("could not encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Something that happened to a game.
///
/// Serializes as `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum GameEvent {
    GameStarted {
        game_id: GameId,
        player1: String,
        player2: String,
    },
    MoveMade {
        game_id: GameId,
        player: String,
        #[serde(rename = "move")]
        mv: Move,
    },
    GameEnded {
        game_id: GameId,
        winner: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<EndReason>,
    },
}

impl GameEvent {
    /// The event type string: `game_started`, `move_made`, `game_ended`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GameStarted { .. } => "game_started",
            Self::MoveMade { .. } => "move_made",
            Self::GameEnded { .. } => "game_ended",
        }
    }

    pub fn game_id(&self) -> GameId {
        match self {
            Self::GameStarted { game_id, .. }
            | Self::MoveMade { game_id, .. }
            | Self::GameEnded { game_id, .. } => *game_id,
        }
    }
}

/// Receives game events.
pub trait EventLog: Send + Sync + 'static {
    fn publish(
        &self,
        event: GameEvent,
    ) -> impl Future<Output = Result<(), EventLogError>> + Send;
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventLog;

impl EventLog for NoopEventLog {
    async fn publish(&self, _event: GameEvent) -> Result<(), EventLogError> {
        Ok(())
    }
}

/// Writes every event to the `tracing` output as one JSON line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    async fn publish(&self, event: GameEvent) -> Result<(), EventLogError> {
        let payload = serde_json::to_string(&event)?;
        tracing::info!(
            target: "fourline::events",
            event = event.kind(),
            game_id = %event.game_id(),
            %payload,
        );
        Ok(())
    }
}
