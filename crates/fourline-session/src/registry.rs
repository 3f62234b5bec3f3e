//! The game registry: every game on the server, and who is playing it.
//!
//! Two indexes are kept:
//!
//! - `GameId → game`, where each game sits behind its own async mutex, so
//!   two moves for the same game are applied one after the other while
//!   moves for different games never wait on each other.
//! - `name → GameId` for the human participants. The automated opponent
//!   is never in this index.
//!
//! Both are sharded `DashMap`s. No shard guard is ever held across an
//! `.await` or while touching the other map's same key, which is the
//! only way `DashMap` deadlocks.
//!
//! ```text
//! create() ──→ update()* ──→ release(p1) ──→ release(p2) ──→ [gone]
//!                   │
//!                   └──────────→ remove() ──────────────────→ [gone]
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use fourline_protocol::GameId;
use tokio::sync::Mutex;

use crate::{BOT_NAME, GameState, RegistryError};

/// One registry slot. The participant names are duplicated outside the
/// lock so the index can be checked without awaiting the game.
struct GameSlot {
    player1: String,
    player2: String,
    state: Arc<Mutex<GameState>>,
}

impl GameSlot {
    fn players(&self) -> [&str; 2] {
        [&self.player1, &self.player2]
    }
}

/// Concurrent store of all games.
///
/// Callers never get a `&mut GameState` that outlives a call: reads return
/// clones, writes go through [`update`](Self::update).
#[derive(Default)]
pub struct SessionRegistry {
    games: DashMap<GameId, GameSlot>,
    players: DashMap<String, GameId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a game and indexes both human participants.
    ///
    /// A participant still indexed to an older game is moved to the new
    /// one; if that leaves the older game with nobody indexed, it is
    /// dropped.
    pub fn create(
        &self,
        player1: impl Into<String>,
        player2: impl Into<String>,
    ) -> GameState {
        let state = GameState::new(player1, player2);
        let id = state.id;

        self.games.insert(
            id,
            GameSlot {
                player1: state.player1.clone(),
                player2: state.player2.clone(),
                state: Arc::new(Mutex::new(state.clone())),
            },
        );

        for name in [&state.player1, &state.player2] {
            if name == BOT_NAME {
                continue;
            }
            if let Some(previous) = self.players.insert(name.clone(), id) {
                if previous != id {
                    tracing::debug!(
                        player = %name,
                        %previous,
                        "participant moved to a new game"
                    );
                    self.remove_if_orphaned(previous);
                }
            }
        }

        tracing::info!(
            game_id = %id,
            player1 = %state.player1,
            player2 = %state.player2,
            "game created"
        );
        state
    }

    /// A snapshot of the game.
    pub async fn get(&self, id: GameId) -> Option<GameState> {
        let state = self.state_handle(id)?;
        let guard = state.lock().await;
        Some(guard.clone())
    }

    /// The game `name` is indexed to, if any.
    pub fn game_id_for(&self, name: &str) -> Option<GameId> {
        self.players.get(name).map(|entry| *entry.value())
    }

    /// A snapshot of the game `name` is indexed to.
    pub async fn get_by_player(&self, name: &str) -> Option<GameState> {
        let id = self.game_id_for(name)?;
        self.get(id).await
    }

    /// Runs `f` against the live game while holding that game's lock.
    ///
    /// Other updates of the same game wait until `f` returns. `f` is
    /// synchronous; anything that has to await must happen after this
    /// call, on data returned from `f`.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] if the game is not held.
    pub async fn update<R>(
        &self,
        id: GameId,
        f: impl FnOnce(&mut GameState) -> R,
    ) -> Result<R, RegistryError> {
        let state = self.state_handle(id).ok_or(RegistryError::NotFound(id))?;
        let mut guard = state.lock().await;
        Ok(f(&mut guard))
    }

    /// Drops the game and every index entry that points at it.
    ///
    /// Returns `true` if the game was held.
    pub fn remove(&self, id: GameId) -> bool {
        let Some((_, slot)) = self.games.remove(&id) else {
            return false;
        };
        for name in slot.players() {
            self.players.remove_if(name, |_, game| *game == id);
        }
        tracing::debug!(game_id = %id, "game removed");
        true
    }

    /// Removes `name` from the participant index.
    ///
    /// The game stays held while the other participant is still indexed to
    /// it, so they can still be reached and the result still read. Returns
    /// the id `name` was indexed to.
    pub fn release(&self, name: &str) -> Option<GameId> {
        let (_, id) = self.players.remove(name)?;
        self.remove_if_orphaned(id);
        Some(id)
    }

    /// Number of games held.
    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    fn state_handle(&self, id: GameId) -> Option<Arc<Mutex<GameState>>> {
        self.games.get(&id).map(|slot| Arc::clone(&slot.state))
    }

    fn remove_if_orphaned(&self, id: GameId) {
        let orphaned = match self.games.get(&id) {
            Some(slot) => slot
                .players()
                .iter()
                .all(|name| self.game_id_for(name) != Some(id)),
            None => false,
        };
        if orphaned {
            self.remove(id);
        }
    }
}
