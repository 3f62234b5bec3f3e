//! # fourline
//!
//! Real-time four-in-a-row game server.
//!
//! Players connect over WebSocket, send `join` with a display name, and are
//! paired with the next player to join, or with an automated opponent when
//! nobody shows up in time. A player who drops mid-game can join again
//! under the same name to take their seat back; after the grace period
//! the game is forfeited to the opponent.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fourline::prelude::*;
//!
//! # async fn run() -> Result<(), FourlineError> {
//! let server = FourlineServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`fourline_engine`] — board rules and the automated opponent
//! - [`fourline_protocol`] — wire messages and codec
//! - [`fourline_transport`] — WebSocket listener and connections
//! - [`fourline_session`] — game state and the game registry
//! - [`fourline_match`] — matchmaking queue and bot fallback
//! - this crate — the [`Hub`], connection handling, and the server

mod config;
mod error;
mod events;
mod handler;
mod hub;
mod server;
mod store;

pub use config::{ConfigError, HubConfig, ServerConfig};
pub use error::FourlineError;
pub use events::{
    EventLog, EventLogError, GameEvent, NoopEventLog, TracingEventLog,
};
pub use hub::{Hub, HubError, JoinOutcome};
pub use server::{FourlineServer, FourlineServerBuilder};
pub use store::{GameStore, GameSummary, MemoryStore, NoopStore, StoreError};

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::{
        EventLog, FourlineError, FourlineServer, FourlineServerBuilder,
        GameEvent, GameStore, GameSummary, Hub, HubConfig, HubError,
        JoinOutcome, MemoryStore, NoopEventLog, NoopStore, ServerConfig,
        TracingEventLog,
    };
    pub use fourline_engine::{HeuristicPolicy, OpponentPolicy};
    pub use fourline_protocol::{ClientMessage, ServerMessage};
    pub use fourline_session::BOT_NAME;
    pub use fourline_transport::ConnectionId;
}
