//! Wire protocol for the fourline game server.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`GameId`], …) —
//!   the typed envelopes that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those envelopes
//!   become bytes and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while doing so.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage / ServerMessage) → Hub
//! ```
//!
//! The protocol layer knows the board types from `fourline-engine` (a
//! move notification carries a [`Move`](fourline_engine::Move)) but
//! nothing about connections, queues, or sessions.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientMessage, DRAW_MARKER, EndReason, GameId, PlayerStats, ServerMessage,
};
