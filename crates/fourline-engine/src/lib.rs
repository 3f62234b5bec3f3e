//! Board rules and the automated opponent for four-in-a-row.
//!
//! This crate is the leaf of the workspace. It knows nothing about
//! players, connections, or games in progress — only about a 6×7 grid
//! and the moves that can be made on it.
//!
//! - [`Board`] — the grid, move application, win/draw detection
//! - [`OpponentPolicy`] / [`HeuristicPolicy`] — how the bot picks a column
//! - [`BoardError`] — the two ways a move can be rejected

mod board;
mod error;
mod policy;

pub use board::{Board, COLS, Move, Outcome, ROWS, Side, WIN_LENGTH};
pub use error::BoardError;
pub use policy::{HeuristicPolicy, OpponentPolicy};
