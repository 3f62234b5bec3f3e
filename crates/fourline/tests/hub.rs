//! Hub behaviour driven directly through its API, without sockets.
//!
//! Connections are plain ids; what a client would see is read from the
//! outbound queue returned by `register`. Timer tests run on a paused
//! clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fourline::prelude::*;
use fourline::EventLogError;
use fourline_engine::{Board, BoardError, Side};
use fourline_protocol::{DRAW_MARKER, EndReason};
use tokio::sync::mpsc::Receiver;

// =========================================================================
// Fixtures
// =========================================================================

/// Always plays the lowest open column.
struct LowestColumn;

impl OpponentPolicy for LowestColumn {
    fn select_move(&self, board: &Board, _side: Side) -> Option<usize> {
        board.valid_columns().first().copied()
    }
}

/// Keeps every published event for inspection.
#[derive(Clone, Default)]
struct RecordingLog(Arc<Mutex<Vec<GameEvent>>>);

impl RecordingLog {
    fn kinds(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().iter().map(GameEvent::kind).collect()
    }
}

impl EventLog for RecordingLog {
    async fn publish(&self, event: GameEvent) -> Result<(), EventLogError> {
        self.0.lock().unwrap().push(event);
        Ok(())
    }
}

/// Records event kinds, taking longer over moves than over anything
/// else.
#[derive(Clone, Default)]
struct SlowLog(Arc<Mutex<Vec<&'static str>>>);

impl EventLog for SlowLog {
    async fn publish(&self, event: GameEvent) -> Result<(), EventLogError> {
        let delay = if matches!(event, GameEvent::MoveMade { .. }) { 5 } else { 0 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.0.lock().unwrap().push(event.kind());
        Ok(())
    }
}

type TestHub = Hub<MemoryStore, RecordingLog>;

fn hub_with(config: HubConfig) -> (Arc<TestHub>, RecordingLog) {
    let log = RecordingLog::default();
    let hub = Hub::new(config, MemoryStore::new(), log.clone(), Arc::new(LowestColumn));
    (hub, log)
}

fn hub() -> (Arc<TestHub>, RecordingLog) {
    hub_with(HubConfig::default())
}

fn conn(id: u64) -> ConnectionId {
    ConnectionId::new(id)
}

async fn recv(rx: &mut Receiver<ServerMessage>) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("message within a second")
        .expect("queue open")
}

fn drain(rx: &mut Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

/// Lets spawned store/log/cleanup tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

struct Pair {
    alice: Receiver<ServerMessage>,
    bob: Receiver<ServerMessage>,
}

/// bob waits on conn-2, alice arrives on conn-1 and so opens as player
/// 1. Both are past `waiting` and `game_start`.
async fn paired<L: EventLog>(hub: &Arc<Hub<MemoryStore, L>>) -> Pair {
    let mut alice = hub.register(conn(1));
    let mut bob = hub.register(conn(2));
    hub.handle_join(conn(2), "bob").await.unwrap();
    hub.handle_join(conn(1), "alice").await.unwrap();

    assert!(matches!(recv(&mut alice).await, ServerMessage::Waiting { .. }));
    assert!(matches!(recv(&mut bob).await, ServerMessage::Waiting { .. }));
    match recv(&mut alice).await {
        ServerMessage::GameStart {
            player1,
            player2,
            your_turn,
            ..
        } => {
            assert_eq!((player1.as_str(), player2.as_str()), ("alice", "bob"));
            assert!(your_turn);
        }
        other => panic!("expected game_start, got {other:?}"),
    }
    assert!(matches!(
        recv(&mut bob).await,
        ServerMessage::GameStart { your_turn: false, .. }
    ));
    Pair { alice, bob }
}

// =========================================================================
// Join
// =========================================================================

#[tokio::test]
async fn test_join_rejects_blank_and_reserved_names() {
    let (hub, _) = hub();
    let _rx = hub.register(conn(1));

    assert!(matches!(
        hub.handle_join(conn(1), "   ").await,
        Err(HubError::NameUnavailable(_))
    ));
    assert!(matches!(
        hub.handle_join(conn(1), BOT_NAME).await,
        Err(HubError::NameUnavailable(_))
    ));
}

#[tokio::test]
async fn test_join_twice_while_waiting_already_joined() {
    let (hub, _) = hub();
    let _rx = hub.register(conn(1));
    hub.handle_join(conn(1), "alice").await.unwrap();

    assert_eq!(
        hub.handle_join(conn(1), "alice").await,
        Err(HubError::AlreadyJoined("alice".into()))
    );
}

#[tokio::test]
async fn test_join_name_held_by_connected_peer_unavailable() {
    let (hub, _) = hub();
    let _a = hub.register(conn(1));
    let _b = hub.register(conn(2));
    hub.handle_join(conn(1), "alice").await.unwrap();

    assert_eq!(
        hub.handle_join(conn(2), "alice").await,
        Err(HubError::NameUnavailable("alice".into()))
    );
}

#[tokio::test]
async fn test_join_unknown_connection_rejected() {
    let (hub, _) = hub();
    assert_eq!(
        hub.handle_join(conn(9), "ghost").await,
        Err(HubError::UnknownConnection(conn(9)))
    );
}

// =========================================================================
// Moves
// =========================================================================

#[tokio::test]
async fn test_move_without_game_no_active_game() {
    let (hub, _) = hub();
    let _rx = hub.register(conn(1));
    assert_eq!(hub.handle_move(conn(1), 0).await, Err(HubError::NoActiveGame));

    hub.handle_join(conn(1), "alice").await.unwrap();
    assert_eq!(
        hub.handle_move(conn(1), 0).await,
        Err(HubError::NoActiveGame),
        "still waiting for an opponent"
    );
}

#[tokio::test]
async fn test_move_out_of_turn_not_your_turn() {
    let (hub, _) = hub();
    let mut p = paired(&hub).await;

    assert_eq!(hub.handle_move(conn(2), 3).await, Err(HubError::NotYourTurn));

    hub.handle_move(conn(1), 3).await.unwrap();
    for rx in [&mut p.alice, &mut p.bob] {
        match recv(rx).await {
            ServerMessage::Move(mv) => {
                assert_eq!((mv.column, mv.row, mv.side), (3, 5, Side::First));
            }
            other => panic!("expected move, got {other:?}"),
        }
    }
    assert_eq!(hub.handle_move(conn(1), 4).await, Err(HubError::NotYourTurn));
}

#[tokio::test]
async fn test_move_bad_columns_rejected_without_state_change() {
    let (hub, _) = hub();
    let mut p = paired(&hub).await;

    assert_eq!(
        hub.handle_move(conn(1), 7).await,
        Err(HubError::Board(BoardError::InvalidColumn(7)))
    );
    assert_eq!(
        hub.handle_move(conn(1), -1).await,
        Err(HubError::Board(BoardError::InvalidColumn(-1)))
    );
    assert!(drain(&mut p.bob).is_empty());

    // Still alice's turn.
    hub.handle_move(conn(1), 0).await.unwrap();
}

#[tokio::test]
async fn test_vertical_stack_first_player_wins() {
    let (hub, log) = hub();
    let mut p = paired(&hub).await;

    for _ in 0..3 {
        hub.handle_move(conn(1), 0).await.unwrap();
        hub.handle_move(conn(2), 6).await.unwrap();
    }
    hub.handle_move(conn(1), 0).await.unwrap();

    for rx in [&mut p.alice, &mut p.bob] {
        let last = drain(rx).pop().expect("messages queued");
        assert_eq!(
            last,
            ServerMessage::GameOver {
                winner: "alice".into(),
                reason: None
            }
        );
    }

    let game = hub.registry().get_by_player("alice").await.unwrap();
    assert!(game.is_finished());
    assert_eq!(
        hub.handle_move(conn(2), 1).await,
        Err(HubError::GameAlreadyFinished)
    );
    assert_eq!(
        hub.handle_move(conn(1), 99).await,
        Err(HubError::GameAlreadyFinished),
        "finished wins over column validity"
    );

    settle().await;
    let alice = hub.store().stats("alice").unwrap();
    let bob = hub.store().stats("bob").unwrap();
    assert_eq!((alice.wins, bob.losses), (1, 1));

    let kinds = log.kinds();
    let count = |kind: &str| kinds.iter().filter(|k| **k == kind).count();
    assert_eq!(count("game_started"), 1);
    assert_eq!(count("move_made"), 7);
    assert_eq!(count("game_ended"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_event_log_receives_game_in_lifecycle_order() {
    let log = SlowLog::default();
    let hub = Hub::new(
        HubConfig::default(),
        MemoryStore::new(),
        log.clone(),
        Arc::new(LowestColumn),
    );
    let _p = paired(&hub).await;

    for _ in 0..3 {
        hub.handle_move(conn(1), 0).await.unwrap();
        hub.handle_move(conn(2), 6).await.unwrap();
    }
    hub.handle_move(conn(1), 0).await.unwrap();

    let kinds = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let kinds = log.0.lock().unwrap().clone();
            if kinds.len() == 9 {
                break kinds;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("every event published");

    let mut expected = vec!["game_started"];
    expected.extend(std::iter::repeat_n("move_made", 7));
    expected.push("game_ended");
    assert_eq!(kinds, expected);
}

#[tokio::test]
async fn test_full_board_ends_in_draw() {
    let (hub, _) = hub();
    let mut p = paired(&hub).await;

    // A fill order with no line of four at any point.
    let order = [
        3, 4, 4, 6, 0, 3, 5, 2, 6, 5, 0, 6, 5, 0, 3, 6, 5, 6, 1, 3, 1, 3, 6, 5,
        2, 0, 5, 3, 4, 4, 0, 1, 1, 1, 0, 1, 4, 2, 4, 2, 2, 2,
    ];
    let mut movers = [conn(1), conn(2)].into_iter().cycle();
    for column in order {
        let mover = movers.next().unwrap();
        hub.handle_move(mover, column).await.unwrap();
    }

    let last = drain(&mut p.alice).pop().unwrap();
    assert_eq!(
        last,
        ServerMessage::GameOver {
            winner: DRAW_MARKER.into(),
            reason: None
        }
    );
    let _ = drain(&mut p.bob);

    settle().await;
    assert_eq!(hub.store().stats("alice").unwrap().draws, 1);
    assert_eq!(hub.store().stats("bob").unwrap().draws, 1);
}

// =========================================================================
// Automated opponent
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_lonely_player_plays_bot_which_answers_each_move() {
    let (hub, _) = hub();
    let mut rx = hub.register(conn(1));
    hub.handle_join(conn(1), "carol").await.unwrap();
    assert!(matches!(recv(&mut rx).await, ServerMessage::Waiting { .. }));

    tokio::time::sleep(Duration::from_secs(11)).await;
    match recv(&mut rx).await {
        ServerMessage::GameStart {
            player1,
            player2,
            your_turn,
            ..
        } => {
            assert_eq!(player1, "carol");
            assert_eq!(player2, BOT_NAME);
            assert!(your_turn);
        }
        other => panic!("expected game_start, got {other:?}"),
    }

    hub.handle_move(conn(1), 3).await.unwrap();
    let own = recv(&mut rx).await;
    let bot = recv(&mut rx).await;
    assert!(matches!(own, ServerMessage::Move(mv) if mv.side == Side::First));
    match bot {
        ServerMessage::Move(mv) => {
            assert_eq!(mv.side, Side::Second);
            assert_eq!(mv.column, 0, "policy picks the lowest open column");
        }
        other => panic!("expected bot move, got {other:?}"),
    }

    // Bot already answered: carol is to move again.
    hub.handle_move(conn(1), 3).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bot_win_counts_only_human_loss() {
    let (hub, _) = hub();
    let mut rx = hub.register(conn(1));
    hub.handle_join(conn(1), "carol").await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    // carol spreads over columns 5 and 6; the bot stacks column 0 and
    // wins on its fourth move.
    for column in [6, 5, 6, 5] {
        hub.handle_move(conn(1), column).await.unwrap();
    }
    let last = drain(&mut rx).pop().unwrap();
    assert_eq!(
        last,
        ServerMessage::GameOver {
            winner: BOT_NAME.into(),
            reason: None
        }
    );

    settle().await;
    assert_eq!(hub.store().stats("carol").unwrap().losses, 1);
    assert!(hub.store().stats(BOT_NAME).is_none());
}

// =========================================================================
// Disconnect, reconnect, forfeit
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_resumes_without_forfeit() {
    let (hub, _) = hub();
    let mut p = paired(&hub).await;
    hub.handle_move(conn(1), 3).await.unwrap();
    hub.handle_move(conn(2), 3).await.unwrap();
    let _ = drain(&mut p.bob);

    hub.unregister(conn(1)).await;
    assert!(hub.is_disconnected(conn(1)));

    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut again = hub.register(conn(3));
    let outcome = hub.handle_join(conn(3), "alice").await.unwrap();
    let game_id = hub.registry().game_id_for("alice").unwrap();
    assert_eq!(outcome, JoinOutcome::Resumed(game_id));

    match recv(&mut again).await {
        ServerMessage::Reconnected {
            board,
            turn,
            your_turn,
            player1,
            ..
        } => {
            assert_eq!(player1, "alice");
            assert_eq!(turn, Side::First);
            assert!(your_turn);
            assert_eq!(board.get(5, 3), Some(Side::First));
            assert_eq!(board.get(4, 3), Some(Side::Second));
        }
        other => panic!("expected reconnected, got {other:?}"),
    }

    // Well past when the first forfeit timer fired.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(
        !drain(&mut p.bob)
            .iter()
            .any(|m| matches!(m, ServerMessage::GameOver { .. })),
        "opponent must never see a forfeit"
    );

    hub.handle_move(conn(3), 4).await.unwrap();
    assert!(matches!(recv(&mut p.bob).await, ServerMessage::Move(_)));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_past_grace_forfeits_to_opponent() {
    let (hub, _) = hub();
    let mut p = paired(&hub).await;
    hub.handle_move(conn(1), 3).await.unwrap();
    let _ = drain(&mut p.bob);

    hub.unregister(conn(1)).await;

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(drain(&mut p.bob).is_empty(), "still inside the grace period");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        recv(&mut p.bob).await,
        ServerMessage::GameOver {
            winner: "bob".into(),
            reason: Some(EndReason::OpponentDisconnected)
        }
    );

    settle().await;
    assert_eq!(hub.store().stats("bob").unwrap().wins, 1);
    assert_eq!(hub.store().stats("alice").unwrap().losses, 1);
    assert_eq!(hub.connection_count(), 1);
    assert_eq!(hub.registry().game_id_for("alice"), None);

    hub.unregister(conn(2)).await;
    assert!(hub.registry().is_empty(), "no dangling game");
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_forfeit_timer_for_removed_game_stays_quiet() {
    let (hub, _) = hub();
    let mut p = paired(&hub).await;
    hub.handle_move(conn(1), 3).await.unwrap();
    let _ = drain(&mut p.bob);

    hub.unregister(conn(1)).await;
    let game_id = hub.registry().game_id_for("bob").unwrap();
    assert!(hub.registry().remove(game_id));

    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;

    assert!(drain(&mut p.bob).is_empty(), "nothing to forfeit");
    assert!(hub.store().games().await.is_empty());
    assert_eq!(hub.connection_count(), 1, "only bob is left");

    // The name is free for a fresh join.
    let _rx = hub.register(conn(3));
    assert_eq!(hub.handle_join(conn(3), "alice").await, Ok(JoinOutcome::Queued));
}

#[tokio::test(start_paused = true)]
async fn test_both_players_vanish_game_collected() {
    let (hub, _) = hub();
    let _p = paired(&hub).await;

    hub.unregister(conn(1)).await;
    hub.unregister(conn(2)).await;
    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;

    assert!(hub.registry().is_empty());
    assert_eq!(hub.connection_count(), 0);
    assert_eq!(hub.store().games().await.len(), 1, "one forfeit recorded");
}

#[tokio::test(start_paused = true)]
async fn test_unregister_while_waiting_leaves_nothing_behind() {
    let (hub, _) = hub();
    let _rx = hub.register(conn(1));
    hub.handle_join(conn(1), "alice").await.unwrap();
    hub.unregister(conn(1)).await;

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(hub.registry().is_empty(), "no bot game for a gone player");
    assert_eq!(hub.connection_count(), 0);

    // The name is free again.
    let _rx = hub.register(conn(2));
    hub.handle_join(conn(2), "alice").await.unwrap();
}

#[tokio::test]
async fn test_full_outbound_queue_drops_recipient() {
    let (hub, _) = hub_with(HubConfig::default().with_outbound_capacity(2));
    let mut alice = hub.register(conn(1));
    let _bob = hub.register(conn(2));
    hub.handle_join(conn(2), "bob").await.unwrap();
    hub.handle_join(conn(1), "alice").await.unwrap();
    settle().await;
    let _ = drain(&mut alice);

    // bob's queue holds waiting + game_start and is never read.
    hub.handle_move(conn(1), 0).await.unwrap();
    settle().await;

    assert!(hub.is_disconnected(conn(2)));
    assert!(!hub.is_disconnected(conn(1)));
}

// =========================================================================
// Leaderboard and replay
// =========================================================================

#[tokio::test]
async fn test_leaderboard_after_game_and_rejoin() {
    let (hub, _) = hub();
    let mut p = paired(&hub).await;
    for _ in 0..3 {
        hub.handle_move(conn(1), 0).await.unwrap();
        hub.handle_move(conn(2), 6).await.unwrap();
    }
    hub.handle_move(conn(1), 0).await.unwrap();
    settle().await;
    let _ = drain(&mut p.alice);

    hub.handle_leaderboard(conn(1), None).await;
    match recv(&mut p.alice).await {
        ServerMessage::Leaderboard { players } => {
            assert_eq!(players[0].username, "alice");
            assert_eq!(players[0].wins, 1);
        }
        other => panic!("expected leaderboard, got {other:?}"),
    }

    // A finished game frees both players to queue again.
    assert_eq!(
        hub.handle_join(conn(1), "alice").await,
        Ok(JoinOutcome::Queued)
    );
}
