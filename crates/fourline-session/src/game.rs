//! The state of a single game between two participants.

use fourline_engine::{Board, BoardError, Move, Outcome, Side};
use fourline_protocol::{DRAW_MARKER, EndReason, GameId};

use crate::RegistryError;

/// Display name of the automated opponent.
///
/// Reserved: no human connection may claim it, and the registry never
/// indexes it, so looking it up by name always comes back empty.
pub const BOT_NAME: &str = "AI Bot";

// ---------------------------------------------------------------------------
// GameResult
// ---------------------------------------------------------------------------

/// How a finished game ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameResult {
    /// One participant won. `reason` is set when the win was not earned on
    /// the board (a forfeit).
    Won {
        winner: String,
        reason: Option<EndReason>,
    },
    /// The board filled up with no four in a row.
    Draw,
}

impl GameResult {
    /// The winner's name, or [`DRAW_MARKER`] for a draw. This is the value
    /// clients see in `game_over.winner`.
    pub fn winner_label(&self) -> &str {
        match self {
            Self::Won { winner, .. } => winner,
            Self::Draw => DRAW_MARKER,
        }
    }

    pub fn reason(&self) -> Option<EndReason> {
        match self {
            Self::Won { reason, .. } => *reason,
            Self::Draw => None,
        }
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// A game in progress or just finished.
///
/// The board and turn only change through [`play`](Self::play), and the
/// result only through [`finish`](Self::finish), which accepts exactly one
/// call. Callers outside the registry see clones; the live value is only
/// reachable inside [`SessionRegistry::update`](crate::SessionRegistry::update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub id: GameId,
    pub player1: String,
    pub player2: String,
    board: Board,
    turn: Side,
    result: Option<GameResult>,
    finished: bool,
}

impl GameState {
    /// A fresh game: empty board, player 1 to move.
    pub fn new(player1: impl Into<String>, player2: impl Into<String>) -> Self {
        Self {
            id: GameId::new(),
            player1: player1.into(),
            player2: player2.into(),
            board: Board::new(),
            turn: Side::First,
            result: None,
            finished: false,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Side to move next.
    pub fn turn(&self) -> Side {
        self.turn
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Name of the participant playing `side`.
    pub fn player(&self, side: Side) -> &str {
        match side {
            Side::First => &self.player1,
            Side::Second => &self.player2,
        }
    }

    /// Which side `name` plays, if they are in this game.
    pub fn side_of(&self, name: &str) -> Option<Side> {
        if self.player1 == name {
            Some(Side::First)
        } else if self.player2 == name {
            Some(Side::Second)
        } else {
            None
        }
    }

    /// True if one of the two seats belongs to the automated opponent.
    pub fn has_bot(&self) -> bool {
        self.player1 == BOT_NAME || self.player2 == BOT_NAME
    }

    /// The side the automated opponent plays, if any.
    pub fn bot_side(&self) -> Option<Side> {
        self.side_of(BOT_NAME)
    }

    /// Plays `column` for `side` and hands the turn to the other side.
    ///
    /// Checks run in a fixed order: a finished game rejects everything,
    /// then the turn is checked, and only then does the board see the
    /// column. Nothing changes on error.
    ///
    /// # Errors
    /// [`RegistryError::AlreadyFinished`], [`RegistryError::NotYourTurn`],
    /// or [`RegistryError::Board`] for an out-of-range or full column.
    pub fn play(
        &mut self,
        side: Side,
        column: i64,
    ) -> Result<Move, RegistryError> {
        if self.finished {
            return Err(RegistryError::AlreadyFinished(self.id));
        }
        if side != self.turn {
            return Err(RegistryError::NotYourTurn);
        }
        let column = usize::try_from(column)
            .map_err(|_| BoardError::InvalidColumn(column))?;
        let mv = self.board.apply_move(column, side)?;
        self.turn = self.turn.opponent();
        Ok(mv)
    }

    /// Converts the board outcome into a result, naming the winner.
    ///
    /// Returns `None` while the game is still open.
    pub fn board_result(&self) -> Option<GameResult> {
        match self.board.check_outcome() {
            Outcome::Ongoing => None,
            Outcome::Draw => Some(GameResult::Draw),
            Outcome::Winner(side) => Some(GameResult::Won {
                winner: self.player(side).to_string(),
                reason: None,
            }),
        }
    }

    /// Records the result and closes the game.
    ///
    /// # Errors
    /// [`RegistryError::AlreadyFinished`] if a result was already set; the
    /// first result stands.
    pub fn finish(&mut self, result: GameResult) -> Result<(), RegistryError> {
        if self.finished {
            return Err(RegistryError::AlreadyFinished(self.id));
        }
        self.result = Some(result);
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> GameState {
        GameState::new("alice", "bob")
    }

    #[test]
    fn test_new_starts_empty_with_first_to_move() {
        let g = game();
        assert_eq!(g.turn(), Side::First);
        assert!(g.board().valid_columns().len() == fourline_engine::COLS);
        assert!(!g.is_finished());
        assert!(g.result().is_none());
    }

    #[test]
    fn test_play_alternates_turn() {
        let mut g = game();
        let mv = g.play(Side::First, 3).unwrap();
        assert_eq!(mv.row, fourline_engine::ROWS - 1);
        assert_eq!(g.turn(), Side::Second);
        g.play(Side::Second, 3).unwrap();
        assert_eq!(g.turn(), Side::First);
    }

    #[test]
    fn test_play_wrong_side_not_your_turn() {
        let mut g = game();
        assert_eq!(g.play(Side::Second, 0), Err(RegistryError::NotYourTurn));
        assert_eq!(g.turn(), Side::First);
    }

    #[test]
    fn test_play_negative_column_invalid_column() {
        let mut g = game();
        assert_eq!(
            g.play(Side::First, -2),
            Err(RegistryError::Board(BoardError::InvalidColumn(-2)))
        );
        assert_eq!(g.turn(), Side::First, "turn unchanged on error");
    }

    #[test]
    fn test_play_after_finish_rejected_regardless_of_column() {
        let mut g = game();
        g.finish(GameResult::Draw).unwrap();
        let id = g.id;
        assert_eq!(
            g.play(Side::First, 99),
            Err(RegistryError::AlreadyFinished(id))
        );
        assert_eq!(
            g.play(Side::Second, 0),
            Err(RegistryError::AlreadyFinished(id))
        );
    }

    #[test]
    fn test_finish_twice_keeps_first_result() {
        let mut g = game();
        g.finish(GameResult::Won {
            winner: "alice".into(),
            reason: None,
        })
        .unwrap();
        assert!(g.finish(GameResult::Draw).is_err());
        assert_eq!(g.result().map(GameResult::winner_label), Some("alice"));
    }

    #[test]
    fn test_board_result_names_winner() {
        let mut g = game();
        for _ in 0..3 {
            g.play(Side::First, 0).unwrap();
            g.play(Side::Second, 6).unwrap();
        }
        assert!(g.board_result().is_none());
        g.play(Side::First, 0).unwrap();
        assert_eq!(
            g.board_result(),
            Some(GameResult::Won {
                winner: "alice".into(),
                reason: None
            })
        );
    }

    #[test]
    fn test_side_of_and_bot_side() {
        let g = GameState::new("carol", BOT_NAME);
        assert_eq!(g.side_of("carol"), Some(Side::First));
        assert_eq!(g.bot_side(), Some(Side::Second));
        assert_eq!(g.side_of("dave"), None);
        assert!(g.has_bot());
        assert!(!game().has_bot());
    }

    #[test]
    fn test_winner_label_draw_marker() {
        assert_eq!(GameResult::Draw.winner_label(), DRAW_MARKER);
        assert_eq!(GameResult::Draw.reason(), None);
    }
}
