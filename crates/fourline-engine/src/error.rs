//! Error types for the board engine.

/// Reasons a move can be rejected by the board.
///
/// Both are caller-input errors: the board is left untouched and the
/// offending player can simply try another column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The column index is outside `0..COLS`.
    ///
    /// Carries a signed value because the wire format allows clients to
    /// send negative numbers; those are rejected here rather than at
    /// decode time.
    #[error("invalid column {0}")]
    InvalidColumn(i64),

    /// The column's top cell is already occupied.
    #[error("column {0} is full")]
    ColumnFull(usize),
}
