//! The 6×7 four-in-a-row grid.
//!
//! Row 0 is the TOP of the board and row 5 the bottom. Pieces drop to the
//! lowest empty row of a column, so a column can never contain a gap —
//! `apply_move` is the only way to place a piece and it always fills
//! bottom-up.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::BoardError;

/// Number of rows on the board.
pub const ROWS: usize = 6;
/// Number of columns on the board.
pub const COLS: usize = 7;
/// Pieces in a line needed to win.
pub const WIN_LENGTH: usize = 4;

/// Wire form of the board: one integer per cell (0 = empty, 1, 2).
type Grid = [[u8; COLS]; ROWS];

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// One of the two players in a game.
///
/// `First` always opens. On the wire a side is just its number (`1` or
/// `2`), which is what browser clients index their boards with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Side {
    First,
    Second,
}

impl Side {
    /// The side that moves after this one.
    pub fn opponent(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }

    /// The player number: 1 or 2.
    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

impl From<Side> for u8 {
    fn from(side: Side) -> Self {
        side.number()
    }
}

impl TryFrom<u8> for Side {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            other => Err(format!("side must be 1 or 2, got {other}")),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

// ---------------------------------------------------------------------------
// Move / Outcome
// ---------------------------------------------------------------------------

/// A piece that has been placed. Produced by [`Board::apply_move`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub column: usize,
    pub row: usize,
    pub side: Side,
}

/// Result of scanning a board for a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No four-in-a-row and at least one column still open.
    Ongoing,
    /// The given side has four in a row.
    Winner(Side),
    /// The board is full and nobody has four in a row.
    Draw,
}

impl Outcome {
    /// Returns `true` for a win or a draw.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Ongoing)
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// The game grid. Cheap to copy, which is how the opponent policy gets
/// its scratch boards for trial moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "Grid", try_from = "Grid")]
pub struct Board {
    cells: [[Option<Side>; COLS]; ROWS],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell at `(row, col)`, or `None` when empty or out of
    /// range.
    pub fn get(&self, row: usize, col: usize) -> Option<Side> {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// Returns `true` if a piece can be dropped into `column`.
    pub fn is_valid_move(&self, column: usize) -> bool {
        column < COLS && self.cells[0][column].is_none()
    }

    /// Drops a piece for `side` into `column`.
    ///
    /// # Errors
    /// - [`BoardError::InvalidColumn`] if `column >= COLS`
    /// - [`BoardError::ColumnFull`] if the column's top cell is occupied
    pub fn apply_move(
        &mut self,
        column: usize,
        side: Side,
    ) -> Result<Move, BoardError> {
        if column >= COLS {
            return Err(BoardError::InvalidColumn(column as i64));
        }

        let row = (0..ROWS)
            .rev()
            .find(|&row| self.cells[row][column].is_none())
            .ok_or(BoardError::ColumnFull(column))?;

        self.cells[row][column] = Some(side);
        Ok(Move { column, row, side })
    }

    /// Scans the whole board for a winner, then for a draw.
    ///
    /// Scan order is rows, columns, diagonals (↘), anti-diagonals (↙);
    /// the first line of four found decides the winner.
    pub fn check_outcome(&self) -> Outcome {
        let directions: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

        for (d_row, d_col) in directions {
            if let Some(side) = self.scan_direction(d_row, d_col) {
                return Outcome::Winner(side);
            }
        }

        if self.cells[0].iter().all(Option::is_some) {
            Outcome::Draw
        } else {
            Outcome::Ongoing
        }
    }

    /// Columns that can still take a piece, in ascending order.
    pub fn valid_columns(&self) -> Vec<usize> {
        (0..COLS).filter(|&col| self.is_valid_move(col)).collect()
    }

    /// Returns `true` when every column is full.
    pub fn is_full(&self) -> bool {
        self.valid_columns().is_empty()
    }

    /// Looks for four in a row along one direction. Start cells are walked
    /// row-major for horizontal/diagonal lines and column-major for
    /// vertical lines.
    fn scan_direction(&self, d_row: isize, d_col: isize) -> Option<Side> {
        let starts: Vec<(usize, usize)> = if d_row == 1 && d_col == 0 {
            (0..COLS)
                .flat_map(|col| (0..ROWS).map(move |row| (row, col)))
                .collect()
        } else {
            (0..ROWS)
                .flat_map(|row| (0..COLS).map(move |col| (row, col)))
                .collect()
        };

        starts
            .into_iter()
            .find_map(|(row, col)| self.line_from(row, col, d_row, d_col))
    }

    /// Returns the side owning all `WIN_LENGTH` cells starting at
    /// `(row, col)` and stepping by `(d_row, d_col)`.
    fn line_from(
        &self,
        row: usize,
        col: usize,
        d_row: isize,
        d_col: isize,
    ) -> Option<Side> {
        let side = self.cells[row][col]?;
        for i in 1..WIN_LENGTH as isize {
            let r = row as isize + d_row * i;
            let c = col as isize + d_col * i;
            if r < 0 || c < 0 || self.get(r as usize, c as usize) != Some(side)
            {
                return None;
            }
        }
        Some(side)
    }
}

impl From<Board> for Grid {
    fn from(board: Board) -> Self {
        let mut grid = [[0u8; COLS]; ROWS];
        for (row, cells) in board.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                grid[row][col] = cell.map_or(0, Side::number);
            }
        }
        grid
    }
}

impl TryFrom<Grid> for Board {
    type Error = String;

    fn try_from(grid: Grid) -> Result<Self, Self::Error> {
        let mut board = Board::new();
        for (row, values) in grid.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                board.cells[row][col] = match value {
                    0 => None,
                    other => Some(Side::try_from(*other)?),
                };
            }
        }
        Ok(board)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.cells {
            let line: String = row
                .iter()
                .map(|cell| match cell {
                    None => '.',
                    Some(Side::First) => 'X',
                    Some(Side::Second) => 'O',
                })
                .collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
