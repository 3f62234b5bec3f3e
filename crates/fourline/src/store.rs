//! Persistence of finished games and per-player statistics.
//!
//! The hub hands every finished game to a [`GameStore`] and reads the
//! leaderboard back from it. Store failures are logged by the hub and
//! never affect a game in progress.

use std::future::Future;

use dashmap::DashMap;
use fourline_protocol::{DRAW_MARKER, EndReason, GameId, PlayerStats};
use fourline_session::BOT_NAME;
use tokio::sync::Mutex;

/// Errors reported by a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing storage could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A finished game, as handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSummary {
    pub id: GameId,
    pub player1: String,
    pub player2: String,
    /// Winner's name, or [`DRAW_MARKER`].
    pub winner: String,
    pub reason: Option<EndReason>,
}

impl GameSummary {
    pub fn is_draw(&self) -> bool {
        self.winner == DRAW_MARKER
    }

    /// The participant who did not win, or `None` for a draw.
    pub fn loser(&self) -> Option<&str> {
        if self.is_draw() {
            None
        } else if self.winner == self.player1 {
            Some(&self.player2)
        } else {
            Some(&self.player1)
        }
    }
}

/// Where finished games go.
pub trait GameStore: Send + Sync + 'static {
    /// Records a finished game and updates both players' counters.
    fn save_game(
        &self,
        summary: GameSummary,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The `limit` players with the most wins, most wins first.
    fn leaderboard(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PlayerStats>, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// NoopStore
// ---------------------------------------------------------------------------

/// Accepts everything, remembers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

impl GameStore for NoopStore {
    async fn save_game(&self, _summary: GameSummary) -> Result<(), StoreError> {
        Ok(())
    }

    async fn leaderboard(
        &self,
        _limit: usize,
    ) -> Result<Vec<PlayerStats>, StoreError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Statistics live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stats: DashMap<String, PlayerStats>,
    games: Mutex<Vec<GameSummary>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for one player, if they have finished a game.
    pub fn stats(&self, username: &str) -> Option<PlayerStats> {
        self.stats.get(username).map(|s| s.value().clone())
    }

    /// Every saved game, oldest first.
    pub async fn games(&self) -> Vec<GameSummary> {
        self.games.lock().await.clone()
    }

    fn bump(&self, username: &str, apply: impl FnOnce(&mut PlayerStats)) {
        if username == BOT_NAME {
            return;
        }
        let mut entry = self
            .stats
            .entry(username.to_string())
            .or_insert_with(|| PlayerStats::new(username));
        apply(entry.value_mut());
    }
}

impl GameStore for MemoryStore {
    async fn save_game(&self, summary: GameSummary) -> Result<(), StoreError> {
        match summary.loser() {
            None => {
                self.bump(&summary.player1, |s| s.draws += 1);
                self.bump(&summary.player2, |s| s.draws += 1);
            }
            Some(loser) => {
                self.bump(&summary.winner, |s| s.wins += 1);
                self.bump(loser, |s| s.losses += 1);
            }
        }
        self.games.lock().await.push(summary);
        Ok(())
    }

    async fn leaderboard(
        &self,
        limit: usize,
    ) -> Result<Vec<PlayerStats>, StoreError> {
        let mut players: Vec<PlayerStats> =
            self.stats.iter().map(|s| s.value().clone()).collect();
        players.sort_by(|a, b| {
            b.wins.cmp(&a.wins).then_with(|| a.username.cmp(&b.username))
        });
        players.truncate(limit);
        Ok(players)
    }
}
