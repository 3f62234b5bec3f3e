//! The automated opponent: picks a column for the bot.
//!
//! The policy looks exactly one move ahead and never remembers anything
//! between calls. Every candidate is tried on a copy of the board, so the
//! caller's board is never touched.

use rand::Rng;

use crate::{Board, COLS, Outcome, ROWS, Side};

/// Columns the fallback prefers when nothing else stands out.
const CENTER_COLUMNS: std::ops::RangeInclusive<usize> = 2..=4;

/// How far a line is walked outward from the landing cell.
const LINE_REACH: isize = 3;

/// Chooses a column for a side on a given board.
///
/// Implementations must be pure with respect to the board: evaluate on
/// copies, return a column, keep no state between games.
pub trait OpponentPolicy: Send + Sync + 'static {
    /// Returns the chosen column, or `None` when the board is full.
    fn select_move(&self, board: &Board, side: Side) -> Option<usize>;
}

/// The default bot: win, else block, else score open lines, else play
/// near the center.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPolicy;

impl OpponentPolicy for HeuristicPolicy {
    fn select_move(&self, board: &Board, side: Side) -> Option<usize> {
        self.select_move_with(board, side, &mut rand::rng())
    }
}

impl HeuristicPolicy {
    /// Same as [`OpponentPolicy::select_move`] with an explicit RNG, so
    /// the random fallback can be made deterministic.
    pub fn select_move_with<R: Rng + ?Sized>(
        &self,
        board: &Board,
        side: Side,
        rng: &mut R,
    ) -> Option<usize> {
        let valid = board.valid_columns();
        if valid.is_empty() {
            return None;
        }

        if let Some(col) = winning_column(board, &valid, side) {
            return Some(col);
        }
        if let Some(col) = winning_column(board, &valid, side.opponent()) {
            return Some(col);
        }
        if let Some(col) = strategic_column(board, &valid, side) {
            return Some(col);
        }

        let center: Vec<usize> = valid
            .iter()
            .copied()
            .filter(|col| CENTER_COLUMNS.contains(col))
            .collect();
        let pool = if center.is_empty() { &valid } else { &center };
        Some(pool[rng.random_range(0..pool.len())])
    }
}

/// First column (ascending) where `side` completes four in a row.
fn winning_column(board: &Board, valid: &[usize], side: Side) -> Option<usize> {
    valid.iter().copied().find(|&col| {
        let mut trial = *board;
        trial.apply_move(col, side).is_ok()
            && trial.check_outcome() == Outcome::Winner(side)
    })
}

/// Column with the strictly highest line score. A score of zero means
/// the move builds nothing, so `None` is returned when no column beats
/// that.
fn strategic_column(
    board: &Board,
    valid: &[usize],
    side: Side,
) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for &col in valid {
        let score = evaluate_column(board, col, side);
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((col, score));
        }
    }
    best.map(|(col, _)| col)
}

fn evaluate_column(board: &Board, column: usize, side: Side) -> u32 {
    let mut trial = *board;
    let Ok(mv) = trial.apply_move(column, side) else {
        return 0;
    };

    [(0, 1), (1, 0), (1, 1), (1, -1)]
        .into_iter()
        .map(|(d_row, d_col)| {
            evaluate_line(&trial, mv.row, mv.column, d_row, d_col, side)
        })
        .sum()
}

/// Scores the line through `(row, col)` in one direction.
///
/// Each half of the line is walked up to three cells: own pieces count,
/// the first empty cell is noted and ends the walk, an opposing piece
/// ends it without counting.
fn evaluate_line(
    board: &Board,
    row: usize,
    col: usize,
    d_row: isize,
    d_col: isize,
    side: Side,
) -> u32 {
    let mut count = 0u32;
    let mut empty = 0u32;

    for dir in [-1isize, 1] {
        for i in 1..=LINE_REACH {
            let r = row as isize + d_row * i * dir;
            let c = col as isize + d_col * i * dir;
            if r < 0 || c < 0 || r as usize >= ROWS || c as usize >= COLS
            {
                break;
            }
            match board.get(r as usize, c as usize) {
                Some(s) if s == side => count += 1,
                None => {
                    empty += 1;
                    break;
                }
                Some(_) => break,
            }
        }
    }

    if count >= 2 && empty >= 1 {
        count * 10
    } else if count >= 1 && empty >= 2 {
        count * 5
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn play(board: &mut Board, moves: &[(usize, Side)]) {
        for &(col, side) in moves {
            board.apply_move(col, side).unwrap();
        }
    }

    #[test]
    fn test_select_move_completes_own_horizontal_three() {
        let mut board = Board::new();
        play(
            &mut board,
            &[
                (0, Side::Second),
                (1, Side::Second),
                (2, Side::Second),
                (0, Side::First),
                (1, Side::First),
            ],
        );

        assert_eq!(HeuristicPolicy.select_move(&board, Side::Second), Some(3));
    }

    #[test]
    fn test_select_move_blocks_opponent_vertical_three() {
        let mut board = Board::new();
        play(
            &mut board,
            &[
                (4, Side::First),
                (4, Side::First),
                (4, Side::First),
                (0, Side::Second),
            ],
        );

        assert_eq!(HeuristicPolicy.select_move(&board, Side::Second), Some(4));
    }

    #[test]
    fn test_select_move_prefers_win_over_block() {
        let mut board = Board::new();
        play(
            &mut board,
            &[
                (0, Side::First),
                (0, Side::First),
                (0, Side::First),
                (6, Side::Second),
                (6, Side::Second),
                (6, Side::Second),
            ],
        );

        assert_eq!(HeuristicPolicy.select_move(&board, Side::Second), Some(6));
    }

    #[test]
    fn test_select_move_does_not_mutate_board() {
        let mut board = Board::new();
        play(&mut board, &[(3, Side::First), (3, Side::Second)]);
        let before = board;

        let _ = HeuristicPolicy.select_move(&board, Side::First);

        assert_eq!(board, before);
    }

    #[test]
    fn test_select_move_empty_board_picks_center_column() {
        let board = Board::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let col = HeuristicPolicy
                .select_move_with(&board, Side::Second, &mut rng)
                .unwrap();
            assert!(CENTER_COLUMNS.contains(&col), "got column {col}");
        }
    }

    #[test]
    fn test_select_move_full_board_returns_none() {
        let mut board = Board::new();
        for col in 0..COLS {
            for row in 0..ROWS {
                let side = if (col / 2 + row) % 2 == 0 {
                    Side::First
                } else {
                    Side::Second
                };
                board.apply_move(col, side).unwrap();
            }
        }
        assert_eq!(HeuristicPolicy.select_move(&board, Side::First), None);
    }

    #[test]
    fn test_strategic_column_prefers_extending_own_pair() {
        // Second has two on the bottom row at 2 and 3; First is scattered
        // far away. Column 1 or 4 extends the pair into an open three.
        let mut board = Board::new();
        play(
            &mut board,
            &[(2, Side::Second), (3, Side::Second), (6, Side::First)],
        );

        let col = strategic_column(&board, &board.valid_columns(), Side::Second);

        assert_eq!(col, Some(1));
    }

    #[test]
    fn test_evaluate_line_counts_stop_at_opponent() {
        let mut board = Board::new();
        play(
            &mut board,
            &[(0, Side::First), (1, Side::Second), (2, Side::Second)],
        );
        // Horizontal through (5, 1): own piece at col 2, then empty at 3
        // on the right; opponent at col 0 on the left.
        let score = evaluate_line(&board, 5, 1, 0, 1, Side::Second);
        // count = 1, empty = 1 → neither bonus applies
        assert_eq!(score, 1);
    }
}
