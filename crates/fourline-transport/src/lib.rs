//! Sockets for fourline.
//!
//! A [`Connection`] moves opaque frames between one browser and the
//! server; what is inside a frame is the protocol crate's business. The
//! hub knows a client only by its [`ConnectionId`].
//!
//! The `websocket` feature (on by default) provides the listener built on
//! `tokio-tungstenite`.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_MAX_MESSAGE_BYTES, PendingWebSocket, WebSocketConnection,
    WebSocketTransport,
};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle for one socket.
///
/// Never reused within a process. A player who reconnects gets a fresh
/// id; their display name, not this id, is what ties them to a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates an id no other connection in this process has had.
    pub fn allocate() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener handing out client sockets.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Pending: PendingConnection<Connection = Self::Connection, Error = Self::Error>;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client socket. No handshake has happened yet;
    /// the caller finishes it with [`PendingConnection::establish`],
    /// normally on the task that will serve the client, so one stalled
    /// client never holds up the listener.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;

    /// The address the listener is bound to.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// An accepted socket that has not completed its handshake.
pub trait PendingConnection: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    fn peer_addr(&self) -> SocketAddr;

    /// Completes the handshake. Gives up after a bounded wait.
    async fn establish(self) -> Result<Self::Connection, Self::Error>;
}

/// One client socket.
///
/// The writer task and the reader loop share a connection; a `recv` that
/// is waiting for the client must never hold up a `send`.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Next data frame. `Ok(None)` once the client has closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}
