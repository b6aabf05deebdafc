//! Error types for proxy setup.
//!
//! Request-scoped failures never surface here: they become HTTP error
//! responses or gRPC statuses on the request that caused them.

use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Failed to bind {0}: {1}")]
    Bind(SocketAddr, #[source] std::io::Error),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to build upstream client: {0}")]
    Client(#[source] std::io::Error),
}
