//! Per-connection handler: inbound intents and outbound delivery.
//!
//! Each accepted socket gets its own Tokio task running this handler,
//! plus a writer task. The flow is:
//!   0. Finish the WebSocket upgrade; a client that fails it never
//!      reaches the hub
//!   1. Register with the hub → receive the connection's outbound queue
//!   2. Spawn the writer: drain the queue, encode, send
//!   3. Loop: receive frames → decode → hand the intent to the hub
//!   4. On close, error, or idle timeout: the drop guard unregisters

use std::sync::Arc;
use std::time::Duration;

use fourline_protocol::{ClientMessage, Codec, ServerMessage};
use fourline_transport::{
    Connection, ConnectionId, PendingConnection, PendingWebSocket,
    TransportError, WebSocketConnection,
};
use tokio::sync::mpsc;

use crate::events::EventLog;
use crate::hub::Hub;
use crate::server::ServerState;
use crate::store::GameStore;

/// Drop guard that unregisters the connection when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, the async unregister runs in a spawned task.
struct ConnectionGuard<S: GameStore, L: EventLog> {
    connection: ConnectionId,
    hub: Arc<Hub<S, L>>,
}

impl<S: GameStore, L: EventLog> Drop for ConnectionGuard<S, L> {
    fn drop(&mut self) {
        let connection = self.connection;
        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            hub.unregister(connection).await;
        });
    }
}

/// What the reader saw next.
enum Frame {
    Data(Vec<u8>),
    Closed,
    Idle,
    Failed(TransportError),
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, L, C>(
    pending: PendingWebSocket,
    state: Arc<ServerState<S, L, C>>,
) where
    S: GameStore,
    L: EventLog,
    C: Codec,
{
    let peer = pending.peer_addr();
    let conn = match pending.establish().await {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            tracing::debug!(%peer, error = %e, "websocket upgrade failed");
            return;
        }
    };
    let connection = conn.id();
    tracing::info!(%connection, %peer, "connection accepted");

    let outbound = state.hub.register(connection);
    let _guard = ConnectionGuard {
        connection,
        hub: Arc::clone(&state.hub),
    };
    let mut writer = tokio::spawn(write_outbound(
        Arc::clone(&conn),
        Arc::clone(&state),
        outbound,
    ));

    loop {
        let frame = tokio::select! {
            frame = next_frame(&conn, state.idle_timeout) => frame,
            _ = &mut writer => {
                tracing::debug!(%connection, "outbound side closed");
                break;
            }
        };

        let data = match frame {
            Frame::Data(data) => data,
            Frame::Closed => {
                tracing::info!(%connection, "connection closed cleanly");
                break;
            }
            Frame::Idle => {
                tracing::info!(%connection, "connection idle, closing");
                break;
            }
            Frame::Failed(e) => {
                tracing::debug!(%connection, error = %e, "recv error");
                break;
            }
        };

        let intent: ClientMessage = match state.codec.decode(&data) {
            Ok(intent) => intent,
            Err(e) => {
                tracing::debug!(
                    %connection, error = %e, "discarding undecodable frame"
                );
                continue;
            }
        };
        dispatch_intent(&state.hub, connection, intent).await;
    }

    if let Err(e) = conn.close().await {
        tracing::debug!(%connection, error = %e, "close failed");
    }
    // _guard drops here → hub.unregister fires.
}

async fn next_frame(
    conn: &WebSocketConnection,
    idle_timeout: Option<Duration>,
) -> Frame {
    let received = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
            Ok(received) => received,
            Err(_) => return Frame::Idle,
        },
        None => conn.recv().await,
    };
    match received {
        Ok(Some(data)) => Frame::Data(data),
        Ok(None) => Frame::Closed,
        Err(e) => Frame::Failed(e),
    }
}

/// Routes one intent. Rejections go back to this connection only.
async fn dispatch_intent<S: GameStore, L: EventLog>(
    hub: &Arc<Hub<S, L>>,
    connection: ConnectionId,
    intent: ClientMessage,
) {
    let result = match intent {
        ClientMessage::Join { username } => {
            hub.handle_join(connection, &username).await.map(|_| ())
        }
        ClientMessage::Move { column } => {
            hub.handle_move(connection, column).await
        }
        ClientMessage::Leaderboard { limit } => {
            hub.handle_leaderboard(connection, limit).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::debug!(%connection, error = %e, "intent rejected");
        hub.send_to(connection, ServerMessage::error(&e));
    }
}

/// Writer task: drains the outbound queue until the hub drops the sender
/// or the transport fails.
async fn write_outbound<S, L, C>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<S, L, C>>,
    mut outbound: mpsc::Receiver<ServerMessage>,
) where
    S: GameStore,
    L: EventLog,
    C: Codec,
{
    let connection = conn.id();
    while let Some(msg) = outbound.recv().await {
        let bytes = match state.codec.encode(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%connection, error = %e, "encode failed");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%connection, error = %e, "send failed");
            break;
        }
    }
}
