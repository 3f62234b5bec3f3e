//! Game state and the game registry for fourline.
//!
//! This crate owns every game on the server:
//!
//! 1. **Game state** — board, side to move, write-once result
//!    ([`GameState`], [`GameResult`])
//! 2. **Registry** — concurrent `GameId → game` and `name → GameId`
//!    indexes with per-game serialized updates ([`SessionRegistry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Matchmaker / Hub (above)  ← create games, apply moves, release players
//!     ↕
//! Session Layer (this crate)  ← owns GameState, serializes updates
//!     ↕
//! Engine + Protocol (below)  ← Board rules, GameId, EndReason
//! ```

mod error;
mod game;
mod registry;

pub use error::RegistryError;
pub use game::{BOT_NAME, GameResult, GameState};
pub use registry::SessionRegistry;
