//! Matchmaking for fourline.
//!
//! Players wait in a FIFO queue. The second player to arrive is paired
//! with the first one waiting; a player left alone for
//! [`MatchConfig::bot_fallback_after`] is paired with the automated
//! opponent instead. Every created game is announced as a [`MatchEvent`].
//!
//! # Key types
//!
//! - [`Matchmaker`] — the queue, pairing, and fallback timers
//! - [`MatchEvent`] — a game was created, with the seats to notify
//! - [`MatchConfig`] — fallback delay

mod config;
mod error;
mod matchmaker;

pub use config::MatchConfig;
pub use error::MatchError;
pub use matchmaker::{Enqueued, MatchEvent, Matchmaker};
