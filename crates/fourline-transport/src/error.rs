use std::net::SocketAddr;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures below the message layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The client opened a socket but never finished the upgrade.
    #[error("upgrade from {peer} timed out")]
    UpgradeTimeout { peer: SocketAddr },

    #[error("upgrade from {peer} rejected: {source}")]
    Upgrade {
        peer: SocketAddr,
        #[source]
        source: BoxError,
    },

    /// Reading or writing an established connection failed.
    #[error("socket error on {connection}: {source}")]
    Socket {
        connection: crate::ConnectionId,
        #[source]
        source: BoxError,
    },
}

impl TransportError {
    /// True for errors that end one connection but leave the listener
    /// usable.
    pub fn is_per_connection(&self) -> bool {
        !matches!(self, Self::Bind { .. })
    }
}
