//! `FourlineServer` builder and server loop.
//!
//! This is the entry point for running a fourline game server. It ties
//! together all the layers: transport → protocol → hub → matchmaking and
//! sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fourline_engine::{HeuristicPolicy, OpponentPolicy};
use fourline_protocol::{Codec, JsonCodec};
use fourline_transport::{Transport, WebSocketTransport};

use crate::FourlineError;
use crate::config::{HubConfig, ServerConfig};
use crate::events::{EventLog, NoopEventLog};
use crate::handler::handle_connection;
use crate::hub::Hub;
use crate::store::{GameStore, NoopStore};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<S: GameStore, L: EventLog, C: Codec> {
    pub(crate) hub: Arc<Hub<S, L>>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Option<Duration>,
}

/// Builder for configuring and starting a fourline server.
///
/// # Example
///
/// ```rust,no_run
/// use fourline::prelude::*;
///
/// # async fn run() -> Result<(), FourlineError> {
/// let server = FourlineServer::builder()
///     .bind("127.0.0.1:8080")
///     .store(MemoryStore::new())
///     .event_log(TracingEventLog)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct FourlineServerBuilder<S = NoopStore, L = NoopEventLog> {
    config: ServerConfig,
    store: S,
    events: L,
    policy: Arc<dyn OpponentPolicy>,
}

impl FourlineServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            store: NoopStore,
            events: NoopEventLog,
            policy: Arc::new(HeuristicPolicy),
        }
    }
}

impl Default for FourlineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GameStore, L: EventLog> FourlineServerBuilder<S, L> {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the hub timings.
    pub fn hub_config(mut self, hub: HubConfig) -> Self {
        self.config.hub = hub;
        self
    }

    /// Caps a single client message; larger ones end the connection.
    pub fn max_message_bytes(mut self, bytes: usize) -> Self {
        self.config.max_message_bytes = bytes;
        self
    }

    /// Closes connections that send nothing for `timeout`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Replaces the automated opponent's move selection.
    pub fn policy(mut self, policy: impl OpponentPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Sets where finished games are persisted.
    pub fn store<S2: GameStore>(self, store: S2) -> FourlineServerBuilder<S2, L> {
        FourlineServerBuilder {
            config: self.config,
            store,
            events: self.events,
            policy: self.policy,
        }
    }

    /// Sets where game lifecycle events are published.
    pub fn event_log<L2: EventLog>(
        self,
        events: L2,
    ) -> FourlineServerBuilder<S, L2> {
        FourlineServerBuilder {
            config: self.config,
            store: self.store,
            events,
            policy: self.policy,
        }
    }

    /// Binds the listener and builds the hub.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<FourlineServer<S, L>, FourlineError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr)
            .await?
            .with_max_message_bytes(self.config.max_message_bytes);
        let hub = Hub::new(self.config.hub, self.store, self.events, self.policy);

        let state = Arc::new(ServerState {
            hub,
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(FourlineServer { transport, state })
    }
}

/// A bound fourline game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct FourlineServer<S: GameStore = NoopStore, L: EventLog = NoopEventLog> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, L, JsonCodec>>,
}

impl FourlineServer {
    /// Creates a new builder.
    pub fn builder() -> FourlineServerBuilder {
        FourlineServerBuilder::new()
    }
}

impl<S: GameStore, L: EventLog> FourlineServer<S, L> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, FourlineError> {
        Ok(self.transport.local_addr()?)
    }

    /// The hub driving this server's games.
    pub fn hub(&self) -> &Arc<Hub<S, L>> {
        &self.state.hub
    }

    /// Runs the server accept loop.
    ///
    /// Accepts sockets and spawns a handler task for each; the WebSocket
    /// upgrade happens on that task. A failed accept is logged and the
    /// loop continues. Runs
    /// until the process is terminated or the future is dropped.
    pub async fn run(mut self) -> Result<(), FourlineError> {
        tracing::info!(addr = %self.local_addr()?, "fourline server running");

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(handle_connection(pending, state));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
