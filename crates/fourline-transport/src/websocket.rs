//! WebSocket listener and connections on `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::{
    Connection, ConnectionId, PendingConnection, Transport, TransportError,
};

/// Time a new socket gets to complete the HTTP upgrade.
const UPGRADE_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest client message accepted. Game intents are a few dozen bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

type Socket = WebSocketStream<TcpStream>;

/// Listens for browser clients.
pub struct WebSocketTransport {
    listener: TcpListener,
    max_message_bytes: usize,
}

impl WebSocketTransport {
    /// Starts listening on `addr` (`host:port`; port 0 picks a free one).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(addr, "listening for websocket clients");
        Ok(Self {
            listener,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        })
    }

    /// Caps the size of a single client message; larger ones end the
    /// connection.
    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }
}

fn limits(max_message: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message);
    config.max_frame_size = Some(max_message);
    config
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Pending = PendingWebSocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<PendingWebSocket, TransportError> {
        let (tcp, peer) =
            self.listener.accept().await.map_err(TransportError::Accept)?;
        tracing::debug!(%peer, "socket accepted");
        Ok(PendingWebSocket {
            tcp,
            peer,
            max_message_bytes: self.max_message_bytes,
        })
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Accept)
    }
}

/// A TCP socket still owing its WebSocket upgrade.
pub struct PendingWebSocket {
    tcp: TcpStream,
    peer: SocketAddr,
    max_message_bytes: usize,
}

impl PendingConnection for PendingWebSocket {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn establish(self) -> Result<WebSocketConnection, TransportError> {
        let peer = self.peer;
        let upgrade = tokio_tungstenite::accept_async_with_config(
            self.tcp,
            Some(limits(self.max_message_bytes)),
        );
        let socket = match tokio::time::timeout(UPGRADE_TIMEOUT, upgrade).await {
            Err(_) => return Err(TransportError::UpgradeTimeout { peer }),
            Ok(Err(e)) => {
                return Err(TransportError::Upgrade {
                    peer,
                    source: Box::new(e),
                });
            }
            Ok(Ok(socket)) => socket,
        };

        let id = ConnectionId::allocate();
        tracing::debug!(connection = %id, %peer, "websocket upgraded");

        let (sink, stream) = socket.split();
        Ok(WebSocketConnection {
            id,
            peer,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// One upgraded client.
///
/// Reading and writing halves sit behind separate locks, so the reader
/// loop parked in `recv` never delays outbound messages.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    sink: Mutex<SplitSink<Socket, Message>>,
    stream: Mutex<SplitStream<Socket>>,
}

impl WebSocketConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn socket_error(&self, e: tokio_tungstenite::tungstenite::Error) -> TransportError {
        TransportError::Socket {
            connection: self.id,
            source: Box::new(e),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        // JSON goes out as text so browsers get a string in `onmessage`.
        let frame = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        let mut sink = self.sink.lock().await;
        sink.send(frame).await.map_err(|e| self.socket_error(e))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut stream = self.stream.lock().await;
        while let Some(frame) = stream.next().await {
            match frame.map_err(|e| self.socket_error(e))? {
                Message::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
                Message::Binary(data) => return Ok(Some(data.to_vec())),
                Message::Close(_) => return Ok(None),
                // Pings are answered inside tungstenite.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.close().await.map_err(|e| self.socket_error(e))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
