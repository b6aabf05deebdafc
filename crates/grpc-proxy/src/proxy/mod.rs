//! Proxy server module.
//!
//! This module provides the intercepting proxy:
//! - One listener multiplexing HTTP/1.1, h2c and TLS
//! - CONNECT tunnels taken over and fed back into the serve loop
//! - gRPC and gRPC-Web calls handed to an interceptor
//! - Passthrough forwarding for all other traffic
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct and main run loop
//! - `router` - Per-request protocol routing
//! - `tunnel` - CONNECT interception
//! - `forwarding` - Passthrough forwarding to the original destination
//! - `client` - HTTP client creation and configuration
//! - `tls` - TLS termination and upstream verification
//! - `network` - Network listener utilities (SO_REUSEADDR)

mod client;
mod forwarding;
mod headers;
mod network;
mod response_ext;
mod router;
mod server;
mod tls;
mod tunnel;

pub use client::{create_http_client, HttpClient};
pub use forwarding::{forward_passthrough, passthrough_uri};
pub use response_ext::{empty_body, error_response, full_body, ProxyBody, ResponseExt};
pub use router::{classify_request, is_grpc_request, ConnectionInfo, Route, Router};
pub use server::ProxyServer;
pub use tls::{install_crypto_provider, PemTlsTerminator, TlsTerminator};
pub use tunnel::{connect_target, handle_connect};
