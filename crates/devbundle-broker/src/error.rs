use std::net::SocketAddr;
use thiserror::Error;

/// Broker error type.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Failed to spawn worker for [{entries}]: {source}")]
    Spawn {
        entries: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker on port {port} not ready after {waited_ms}ms")]
    NotReady { port: u16, waited_ms: u64 },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Broker server failed: {0}")]
    Serve(String),

    #[error("Proxy to worker failed: {0}")]
    Proxy(String),

    #[error(transparent)]
    Core(#[from] devbundle_core::Error),
}
