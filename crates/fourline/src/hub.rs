//! The connection hub: live connections, player intents, and fan-out.
//!
//! Every connection moves through
//!
//! ```text
//! connected-unjoined ──join──→ connected-joined ──drop, game running──→ disconnected
//!                                     │                                     │
//!                                     │                  rejoin ←───────────┤
//!                                     ▼                                     ▼ grace elapsed
//!                                 terminated ←──────────────────────── forfeit
//! ```
//!
//! Locks are taken one structure at a time: the live-connection map, the
//! name index, the matchmaking queue, and one game. Messages for a game
//! are queued while that game's lock is held and never awaited, so both
//! participants see the game's messages in the order they happened. Game
//! events go the same way onto one publishing queue, drained by a single
//! task, so the event log sees each game's events in lifecycle order.
//! Store writes and the cleanup of recipients found dead during a
//! broadcast run after the lock is released.

use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fourline_engine::{BoardError, HeuristicPolicy, Move, OpponentPolicy, Side};
use fourline_match::{MatchError, MatchEvent, Matchmaker};
use fourline_protocol::{EndReason, GameId, ServerMessage};
use fourline_session::{
    BOT_NAME, GameResult, GameState, RegistryError, SessionRegistry,
};
use fourline_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::config::HubConfig;
use crate::events::{EventLog, GameEvent, NoopEventLog};
use crate::store::{GameStore, GameSummary, NoopStore};

/// Acknowledgement sent right after a successful join.
const WAITING_MESSAGE: &str = "Waiting for opponent...";

/// Upper bound on leaderboard rows a client may ask for.
const MAX_LEADERBOARD_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected player intents. The `Display` text is what the client sees in
/// its `error` message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The connection was never registered or is already gone.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The connection is waiting for or playing a game under this name.
    #[error("Already joined as {0}")]
    AlreadyJoined(String),

    /// Blank, reserved, or held by another connected player.
    #[error("Name {0:?} is not available")]
    NameUnavailable(String),

    #[error("No active game found")]
    NoActiveGame,

    #[error("Game is already finished")]
    GameAlreadyFinished,

    #[error("Not your turn")]
    NotYourTurn,

    /// Out-of-range or full column.
    #[error(transparent)]
    Board(#[from] BoardError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl From<RegistryError> for HubError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => Self::NoActiveGame,
            RegistryError::AlreadyFinished(_) => Self::GameAlreadyFinished,
            RegistryError::NotYourTurn => Self::NotYourTurn,
            RegistryError::Board(e) => Self::Board(e),
        }
    }
}

/// What a successful join led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// In the matchmaking queue (or already paired by it).
    Queued,
    /// Took over a dropped connection's seat in a running game.
    Resumed(GameId),
}

// ---------------------------------------------------------------------------
// Live connections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum LinkState {
    Connected,
    Disconnected { since: Instant },
}

#[derive(Debug)]
struct LiveConnection {
    /// `None` once the transport is gone.
    outbound: Option<mpsc::Sender<ServerMessage>>,
    name: Option<String>,
    link: LinkState,
}

/// Side effects collected under a game lock and carried out after it.
#[derive(Default)]
struct Dispatch {
    finished: Option<GameSummary>,
    dropped: Vec<ConnectionId>,
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Owns all live connections and drives every game.
pub struct Hub<S: GameStore = NoopStore, L: EventLog = NoopEventLog> {
    config: HubConfig,
    registry: Arc<SessionRegistry>,
    matchmaker: Arc<Matchmaker>,
    policy: Arc<dyn OpponentPolicy>,
    store: Arc<S>,
    events: Arc<L>,
    publish: mpsc::UnboundedSender<GameEvent>,
    connections: DashMap<ConnectionId, LiveConnection>,
    names: DashMap<String, ConnectionId>,
}

impl Hub {
    /// A hub with no persistence, no event log, and the default policy.
    pub fn with_config(config: HubConfig) -> Arc<Self> {
        Self::new(
            config,
            NoopStore,
            NoopEventLog,
            Arc::new(HeuristicPolicy),
        )
    }
}

impl<S: GameStore, L: EventLog> Hub<S, L> {
    /// Creates the hub and starts its two background tasks: one announces
    /// new games, the other publishes game events in order.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: HubConfig,
        store: S,
        events: L,
        policy: Arc<dyn OpponentPolicy>,
    ) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let (matchmaker, match_events) =
            Matchmaker::new(config.match_config(), Arc::clone(&registry));
        let events = Arc::new(events);
        let (publish, published) = mpsc::unbounded_channel();
        tokio::spawn(publish_events(Arc::clone(&events), published));

        let hub = Arc::new(Self {
            config,
            registry,
            matchmaker,
            policy,
            store: Arc::new(store),
            events,
            publish,
            connections: DashMap::new(),
            names: DashMap::new(),
        });

        tokio::spawn(announce_games(Arc::downgrade(&hub), match_events));
        hub
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn event_log(&self) -> &L {
        &self.events
    }

    /// Live connections, including those waiting out a grace period.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// True while `connection` is dropped but its game is still waiting
    /// for it to come back.
    pub fn is_disconnected(&self, connection: ConnectionId) -> bool {
        self.connections
            .get(&connection)
            .is_some_and(|c| matches!(c.link, LinkState::Disconnected { .. }))
    }

    // -- Lifecycle --------------------------------------------------------

    /// Adds a connection and returns the queue its messages arrive on.
    pub fn register(
        &self,
        connection: ConnectionId,
    ) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        self.connections.insert(
            connection,
            LiveConnection {
                outbound: Some(tx),
                name: None,
                link: LinkState::Connected,
            },
        );
        tracing::debug!(%connection, "connection registered");
        rx
    }

    /// The transport for `connection` is gone.
    ///
    /// A player in a running game keeps their seat for the reconnection
    /// grace period; everyone else is removed at once. Calling this for an
    /// unknown or already disconnected connection does nothing.
    pub async fn unregister(self: &Arc<Self>, connection: ConnectionId) {
        self.matchmaker.dequeue(connection).await;

        let name = match self.connections.get(&connection) {
            None => return,
            Some(live) if matches!(live.link, LinkState::Disconnected { .. }) => {
                return;
            }
            Some(live) => live.name.clone(),
        };

        let in_running_game = match &name {
            Some(name) => self
                .registry
                .get_by_player(name)
                .await
                .is_some_and(|game| !game.is_finished()),
            None => false,
        };

        if !in_running_game {
            self.remove_connection(connection);
            return;
        }

        if let Some(mut live) = self.connections.get_mut(&connection) {
            live.outbound = None;
            live.link = LinkState::Disconnected {
                since: Instant::now(),
            };
        }
        tracing::info!(
            %connection,
            player = name.as_deref().unwrap_or_default(),
            grace_secs = self.config.reconnect_grace.as_secs(),
            "player disconnected mid-game, holding seat"
        );
        self.arm_forfeit(connection);
    }

    // -- Intents ----------------------------------------------------------

    /// Claims `name` for `connection` and puts it in the matchmaking queue,
    /// or seats it back in its game if a dropped connection left one
    /// running under that name.
    ///
    /// # Errors
    /// [`HubError::NameUnavailable`], [`HubError::AlreadyJoined`],
    /// [`HubError::UnknownConnection`].
    pub async fn handle_join(
        self: &Arc<Self>,
        connection: ConnectionId,
        name: &str,
    ) -> Result<JoinOutcome, HubError> {
        let name = name.trim();
        if name.is_empty() || name == BOT_NAME {
            return Err(HubError::NameUnavailable(name.to_string()));
        }

        let current = self
            .connections
            .get(&connection)
            .ok_or(HubError::UnknownConnection(connection))?
            .name
            .clone();

        match current {
            Some(current) => {
                self.rejoin(connection, current, name).await?;
            }
            None => {
                if let Some(game_id) = self.claim_name(connection, name).await? {
                    return Ok(JoinOutcome::Resumed(game_id));
                }
            }
        }

        self.send_to(connection, ServerMessage::Waiting {
            message: WAITING_MESSAGE.to_string(),
        });
        self.matchmaker.enqueue(connection, name).await?;
        tracing::info!(%connection, player = name, "player joined");
        Ok(JoinOutcome::Queued)
    }

    /// Plays `column` for the player on `connection`, then lets the
    /// automated opponent answer if it is its turn.
    ///
    /// # Errors
    /// [`HubError::NoActiveGame`], [`HubError::GameAlreadyFinished`],
    /// [`HubError::NotYourTurn`], [`HubError::Board`].
    pub async fn handle_move(
        self: &Arc<Self>,
        connection: ConnectionId,
        column: i64,
    ) -> Result<(), HubError> {
        let name = self
            .connections
            .get(&connection)
            .and_then(|live| live.name.clone())
            .ok_or(HubError::NoActiveGame)?;
        let game_id = self
            .registry
            .game_id_for(&name)
            .ok_or(HubError::NoActiveGame)?;

        let mut dispatch = Dispatch::default();
        let result = self
            .registry
            .update(game_id, |game| {
                self.play_turn(game, &name, column, &mut dispatch)
            })
            .await?;
        self.flush(dispatch);
        result
    }

    /// Replies to `connection` with the top of the leaderboard. A failing
    /// store yields an empty list.
    pub async fn handle_leaderboard(
        self: &Arc<Self>,
        connection: ConnectionId,
        limit: Option<usize>,
    ) {
        let limit = limit
            .unwrap_or(self.config.leaderboard_limit)
            .min(MAX_LEADERBOARD_LIMIT);
        let players = match self.store.leaderboard(limit).await {
            Ok(players) => players,
            Err(e) => {
                tracing::warn!(error = %e, "leaderboard read failed");
                Vec::new()
            }
        };
        self.send_to(connection, ServerMessage::Leaderboard { players });
    }

    /// Queues `msg` for `connection` alone. A full or closed queue counts
    /// as a lost connection.
    pub fn send_to(self: &Arc<Self>, connection: ConnectionId, msg: ServerMessage) {
        let mut dispatch = Dispatch::default();
        self.deliver(connection, msg, &mut dispatch);
        self.flush(dispatch);
    }

    // -- Join helpers -----------------------------------------------------

    /// First join on this connection. Returns the game id if the name's
    /// previous holder had a running game that this connection now plays.
    async fn claim_name(
        self: &Arc<Self>,
        connection: ConnectionId,
        name: &str,
    ) -> Result<Option<GameId>, HubError> {
        let previous = match self.names.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(connection);
                None
            }
            Entry::Occupied(mut slot) => {
                let holder = *slot.get();
                let holder_connected = self.connections.get(&holder).is_some_and(
                    |c| matches!(c.link, LinkState::Connected),
                );
                if holder_connected {
                    return Err(HubError::NameUnavailable(name.to_string()));
                }
                slot.insert(connection);
                Some(holder)
            }
        };

        if let Some(mut live) = self.connections.get_mut(&connection) {
            live.name = Some(name.to_string());
        }

        let Some(previous) = previous else {
            return Ok(None);
        };
        // The pending forfeit timer finds this gone and stands down.
        self.connections.remove(&previous);

        let Some(game_id) = self.registry.game_id_for(name) else {
            return Ok(None);
        };
        let mut dispatch = Dispatch::default();
        let resumed = self
            .registry
            .update(game_id, |game| {
                if game.is_finished() {
                    return false;
                }
                let Some(side) = game.side_of(name) else {
                    return false;
                };
                self.deliver(
                    connection,
                    ServerMessage::Reconnected {
                        game_id: game.id,
                        player1: game.player1.clone(),
                        player2: game.player2.clone(),
                        board: *game.board(),
                        turn: game.turn(),
                        your_turn: game.turn() == side,
                    },
                    &mut dispatch,
                );
                true
            })
            .await
            .unwrap_or(false);
        self.flush(dispatch);

        if resumed {
            tracing::info!(
                %connection,
                %previous,
                %game_id,
                player = name,
                "player reconnected"
            );
            Ok(Some(game_id))
        } else {
            self.registry.release(name);
            Ok(None)
        }
    }

    /// Join on a connection that already has a name: allowed once its last
    /// game is over, under the same name or a free one.
    async fn rejoin(
        self: &Arc<Self>,
        connection: ConnectionId,
        current: String,
        name: &str,
    ) -> Result<(), HubError> {
        let busy = self.matchmaker.is_waiting(connection).await
            || self
                .registry
                .get_by_player(&current)
                .await
                .is_some_and(|game| !game.is_finished());
        if busy {
            return Err(HubError::AlreadyJoined(current));
        }

        if current != name {
            match self.names.entry(name.to_string()) {
                Entry::Occupied(_) => {
                    return Err(HubError::NameUnavailable(name.to_string()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(connection);
                }
            }
            self.names.remove_if(&current, |_, holder| *holder == connection);
            if let Some(mut live) = self.connections.get_mut(&connection) {
                live.name = Some(name.to_string());
            }
        }
        self.registry.release(&current);
        Ok(())
    }

    // -- Game progression (called under the game lock) --------------------

    fn play_turn(
        &self,
        game: &mut GameState,
        name: &str,
        column: i64,
        dispatch: &mut Dispatch,
    ) -> Result<(), HubError> {
        let side = game.side_of(name).ok_or(HubError::NoActiveGame)?;
        let mv = game.play(side, column)?;
        self.after_move(game, mv, dispatch);

        if game.is_finished() {
            return Ok(());
        }
        if let Some(bot) = game.bot_side() {
            if game.turn() == bot {
                self.play_bot(game, bot, dispatch);
            }
        }
        Ok(())
    }

    fn play_bot(
        &self,
        game: &mut GameState,
        bot: Side,
        dispatch: &mut Dispatch,
    ) {
        let Some(column) = self.policy.select_move(game.board(), bot) else {
            tracing::warn!(game_id = %game.id, "bot found no legal move");
            return;
        };
        match game.play(bot, column as i64) {
            Ok(mv) => self.after_move(game, mv, dispatch),
            Err(e) => {
                tracing::warn!(game_id = %game.id, error = %e, "bot move rejected");
            }
        }
    }

    fn after_move(&self, game: &mut GameState, mv: Move, dispatch: &mut Dispatch) {
        tracing::debug!(
            game_id = %game.id,
            column = mv.column,
            row = mv.row,
            side = %mv.side,
            "move applied"
        );
        self.broadcast(game, &ServerMessage::Move(mv), dispatch);
        self.record(GameEvent::MoveMade {
            game_id: game.id,
            player: game.player(mv.side).to_string(),
            mv,
        });
        if let Some(result) = game.board_result() {
            self.resolve_game_end(game, result, dispatch);
        }
    }

    /// Closes the game with `result`. A game that already has a result is
    /// left as it is.
    fn resolve_game_end(
        &self,
        game: &mut GameState,
        result: GameResult,
        dispatch: &mut Dispatch,
    ) {
        if game.finish(result.clone()).is_err() {
            tracing::debug!(game_id = %game.id, "game already resolved");
            return;
        }
        let winner = result.winner_label().to_string();
        let reason = result.reason();

        tracing::info!(game_id = %game.id, %winner, ?reason, "game over");
        self.broadcast(
            game,
            &ServerMessage::GameOver {
                winner: winner.clone(),
                reason,
            },
            dispatch,
        );
        self.record(GameEvent::GameEnded {
            game_id: game.id,
            winner: winner.clone(),
            reason,
        });
        dispatch.finished = Some(GameSummary {
            id: game.id,
            player1: game.player1.clone(),
            player2: game.player2.clone(),
            winner,
            reason,
        });
    }

    // -- Delivery ---------------------------------------------------------

    fn broadcast(&self, game: &GameState, msg: &ServerMessage, dispatch: &mut Dispatch) {
        for name in [&game.player1, &game.player2] {
            if let Some(connection) = self.connection_for(name) {
                self.deliver(connection, msg.clone(), dispatch);
            }
        }
    }

    fn connection_for(&self, name: &str) -> Option<ConnectionId> {
        if name == BOT_NAME {
            return None;
        }
        self.names.get(name).map(|entry| *entry.value())
    }

    /// Never blocks. Disconnected recipients are skipped; recipients whose
    /// queue is full or closed are recorded for cleanup.
    fn deliver(&self, connection: ConnectionId, msg: ServerMessage, dispatch: &mut Dispatch) {
        let outbound = self
            .connections
            .get(&connection)
            .and_then(|live| live.outbound.clone());
        let Some(outbound) = outbound else {
            return;
        };
        if let Err(e) = outbound.try_send(msg) {
            tracing::warn!(%connection, error = %e, "dropping unreachable recipient");
            dispatch.dropped.push(connection);
        }
    }

    /// Queues `event` for the publisher. Called under the game lock, so
    /// the queue order is the game's order.
    fn record(&self, event: GameEvent) {
        if let Err(e) = self.publish.send(event) {
            tracing::warn!(event = e.0.kind(), "event publisher gone");
        }
    }

    /// Carries out what was collected under a game lock.
    fn flush(self: &Arc<Self>, dispatch: Dispatch) {
        if let Some(summary) = dispatch.finished {
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                let game_id = summary.id;
                if let Err(e) = store.save_game(summary).await {
                    tracing::warn!(%game_id, error = %e, "saving game failed");
                }
            });
        }

        for connection in dispatch.dropped {
            let hub = Arc::clone(self);
            tokio::spawn(async move { hub.unregister(connection).await });
        }
    }

    // -- Removal and forfeit ----------------------------------------------

    fn remove_connection(&self, connection: ConnectionId) {
        let Some((_, live)) = self.connections.remove(&connection) else {
            return;
        };
        if let Some(name) = live.name {
            self.names.remove_if(&name, |_, holder| *holder == connection);
            self.registry.release(&name);
            tracing::info!(%connection, player = %name, "player left");
        } else {
            tracing::debug!(%connection, "connection removed");
        }
    }

    fn arm_forfeit(self: &Arc<Self>, connection: ConnectionId) {
        let weak = Arc::downgrade(self);
        let grace = self.config.reconnect_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(hub) = weak.upgrade() {
                hub.expire(connection).await;
            }
        });
    }

    /// Forfeit timer body. Acts only if `connection` is still present and
    /// still disconnected; a reconnect has removed it.
    async fn expire(self: &Arc<Self>, connection: ConnectionId) {
        let Some((_, live)) = self.connections.remove_if(&connection, |_, live| {
            matches!(live.link, LinkState::Disconnected { .. })
        }) else {
            return;
        };
        let Some(name) = live.name else {
            return;
        };
        if let LinkState::Disconnected { since } = live.link {
            tracing::info!(
                %connection,
                player = %name,
                away_secs = since.elapsed().as_secs(),
                "grace period over"
            );
        }
        if self
            .names
            .remove_if(&name, |_, holder| *holder == connection)
            .is_none()
        {
            // A rejoin took the name over while this timer was firing.
            return;
        }

        if let Some(game_id) = self.registry.game_id_for(&name) {
            let mut dispatch = Dispatch::default();
            let forfeited = self
                .registry
                .update(game_id, |game| {
                    if game.is_finished() {
                        return;
                    }
                    let Some(side) = game.side_of(&name) else {
                        return;
                    };
                    let winner = game.player(side.opponent()).to_string();
                    tracing::info!(
                        %game_id,
                        forfeited_by = %name,
                        %winner,
                        "game forfeited"
                    );
                    self.resolve_game_end(
                        game,
                        GameResult::Won {
                            winner,
                            reason: Some(EndReason::OpponentDisconnected),
                        },
                        &mut dispatch,
                    );
                })
                .await;
            if let Err(e) = forfeited {
                tracing::debug!(%game_id, error = %e, "game gone before forfeit");
            }
            self.flush(dispatch);
        }
        self.registry.release(&name);
    }

    // -- Match events -----------------------------------------------------

    async fn on_game_created(self: &Arc<Self>, event: MatchEvent) {
        let game_id = event.game.id;
        let mut dispatch = Dispatch::default();
        let announced = self
            .registry
            .update(game_id, |game| {
                for side in [Side::First, Side::Second] {
                    let Some(connection) = self.connection_for(game.player(side)) else {
                        continue;
                    };
                    self.deliver(
                        connection,
                        ServerMessage::GameStart {
                            game_id: game.id,
                            player1: game.player1.clone(),
                            player2: game.player2.clone(),
                            your_turn: game.turn() == side,
                        },
                        &mut dispatch,
                    );
                }
                self.record(GameEvent::GameStarted {
                    game_id: game.id,
                    player1: game.player1.clone(),
                    player2: game.player2.clone(),
                });
                if let Some(bot) = game.bot_side() {
                    if game.turn() == bot {
                        self.play_bot(game, bot, &mut dispatch);
                    }
                }
            })
            .await;

        if announced.is_err() {
            tracing::debug!(%game_id, "game gone before it was announced");
        }
        self.flush(dispatch);
    }
}

/// Hands events to the log one at a time, waiting for each publish to
/// finish before the next. Ends when the hub is dropped.
async fn publish_events<L: EventLog>(
    log: Arc<L>,
    mut events: mpsc::UnboundedReceiver<GameEvent>,
) {
    while let Some(event) = events.recv().await {
        let kind = event.kind();
        let game_id = event.game_id();
        if let Err(e) = log.publish(event).await {
            tracing::warn!(event = kind, %game_id, error = %e, "event publish failed");
        }
    }
}

/// Forwards matchmaker events to the hub for as long as the hub lives.
async fn announce_games<S: GameStore, L: EventLog>(
    hub: Weak<Hub<S, L>>,
    mut events: mpsc::UnboundedReceiver<MatchEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(hub) = hub.upgrade() else {
            break;
        };
        hub.on_game_created(event).await;
    }
}
