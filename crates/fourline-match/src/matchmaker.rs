//! The waiting queue: pairs players, or hands them to the automated
//! opponent when nobody turns up in time.
//!
//! ```text
//! enqueue() ──→ [queued] ──(another player enqueues)──→ [matched]
//!                  │
//!                  ├──(bot_fallback_after elapses)───→ [matched with bot]
//!                  │
//!                  └──(dequeue)──────────────────────→ [gone]
//! ```
//!
//! Pairing and the fallback timer both run with the queue lock held and
//! look at the queue as it is *then*. An entry can leave the queue only
//! once, so a player is matched at most once however the two race.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use fourline_engine::Side;
use fourline_protocol::GameId;
use fourline_session::{BOT_NAME, GameState, SessionRegistry};
use fourline_transport::ConnectionId;
use tokio::sync::{Mutex, mpsc};

use crate::{MatchConfig, MatchError};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Emitted once per created game.
///
/// Delivered on an unbounded channel so that the task that caused the
/// pairing never waits for whoever announces the game.
#[derive(Debug, Clone)]
pub struct MatchEvent {
    /// Snapshot of the new game.
    pub game: GameState,
    /// Human connections seated in the game and the side each plays.
    pub seats: Vec<(ConnectionId, Side)>,
}

impl MatchEvent {
    pub fn against_bot(&self) -> bool {
        self.game.has_bot()
    }
}

/// What happened to an `enqueue` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Another player was waiting; the game already exists.
    Paired(GameId),
    /// Nobody was waiting; the fallback timer is armed.
    Waiting,
}

// ---------------------------------------------------------------------------
// Matchmaker
// ---------------------------------------------------------------------------

/// A queued player.
///
/// `ticket` is fresh for every enqueue, so a timer armed for an earlier
/// stay in the queue can never act on a later one.
#[derive(Debug)]
struct WaitingEntry {
    connection: ConnectionId,
    name: String,
    ticket: u64,
}

/// Pairs waiting players into games.
pub struct Matchmaker {
    config: MatchConfig,
    registry: Arc<SessionRegistry>,
    queue: Mutex<VecDeque<WaitingEntry>>,
    events: mpsc::UnboundedSender<MatchEvent>,
    next_ticket: AtomicU64,
}

impl Matchmaker {
    /// Creates a matchmaker and the receiving end of its event channel.
    pub fn new(
        config: MatchConfig,
        registry: Arc<SessionRegistry>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MatchEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let matchmaker = Arc::new(Self {
            config,
            registry,
            queue: Mutex::new(VecDeque::new()),
            events,
            next_ticket: AtomicU64::new(1),
        });
        (matchmaker, rx)
    }

    /// Puts a player in the queue, pairing them on the spot if someone is
    /// already waiting.
    ///
    /// The arriving player becomes player 1 and moves first; the one who
    /// was waiting plays second.
    ///
    /// # Errors
    /// - [`MatchError::ReservedName`] for the automated opponent's name
    /// - [`MatchError::AlreadyQueued`] if `connection` is already waiting
    pub async fn enqueue(
        self: &Arc<Self>,
        connection: ConnectionId,
        name: impl Into<String>,
    ) -> Result<Enqueued, MatchError> {
        let name = name.into();
        if name == BOT_NAME {
            return Err(MatchError::ReservedName(name));
        }

        let mut queue = self.queue.lock().await;
        if queue.iter().any(|e| e.connection == connection) {
            return Err(MatchError::AlreadyQueued(connection));
        }

        let partner = queue
            .iter()
            .position(|e| e.name != name)
            .and_then(|idx| queue.remove(idx));

        if let Some(partner) = partner {
            let game = self.registry.create(&name, &partner.name);
            let id = game.id;
            drop(queue);

            tracing::info!(
                game_id = %id,
                player1 = %name,
                player2 = %partner.name,
                "players paired"
            );
            self.announce(MatchEvent {
                game,
                seats: vec![
                    (connection, Side::First),
                    (partner.connection, Side::Second),
                ],
            });
            return Ok(Enqueued::Paired(id));
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        queue.push_back(WaitingEntry {
            connection,
            name: name.clone(),
            ticket,
        });
        drop(queue);

        tracing::debug!(%connection, player = %name, "waiting for opponent");
        self.arm_fallback(connection, ticket);
        Ok(Enqueued::Waiting)
    }

    /// Removes `connection` from the queue. Safe to call for connections
    /// that were never queued or were already matched.
    ///
    /// Returns `true` if an entry was removed.
    pub async fn dequeue(&self, connection: ConnectionId) -> bool {
        let mut queue = self.queue.lock().await;
        let before = queue.len();
        queue.retain(|e| e.connection != connection);
        let removed = queue.len() != before;
        if removed {
            tracing::debug!(%connection, "left matchmaking queue");
        }
        removed
    }

    /// Number of players currently waiting.
    pub async fn waiting_count(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_waiting(&self, connection: ConnectionId) -> bool {
        self.queue
            .lock()
            .await
            .iter()
            .any(|e| e.connection == connection)
    }

    fn arm_fallback(self: &Arc<Self>, connection: ConnectionId, ticket: u64) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let after = self.config.bot_fallback_after;
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(matchmaker) = weak.upgrade() {
                matchmaker.fallback_to_bot(connection, ticket).await;
            }
        });
    }

    /// Timer body. Only acts if this exact queue stay is still present.
    async fn fallback_to_bot(&self, connection: ConnectionId, ticket: u64) {
        let mut queue = self.queue.lock().await;
        let Some(idx) = queue
            .iter()
            .position(|e| e.connection == connection && e.ticket == ticket)
        else {
            return;
        };
        let Some(entry) = queue.remove(idx) else {
            return;
        };
        let game = self.registry.create(&entry.name, BOT_NAME);
        drop(queue);

        tracing::info!(
            game_id = %game.id,
            player = %entry.name,
            "no opponent found, pairing with bot"
        );
        self.announce(MatchEvent {
            game,
            seats: vec![(connection, Side::First)],
        });
    }

    fn announce(&self, event: MatchEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("match event receiver dropped, game not announced");
        }
    }
}
