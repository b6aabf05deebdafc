//! Intercepting proxy for gRPC traffic.
//!
//! A single listener accepts plaintext HTTP/1.1, cleartext HTTP/2 and TLS.
//! CONNECT tunnels are taken over and re-enter the listener so their TLS can
//! be terminated locally. gRPC and gRPC-Web calls are served by an
//! [`grpc::Interceptor`]; everything else is forwarded to where the client
//! was sending it.

pub mod config;
pub mod error;
pub mod grpc;
pub mod listener;
pub mod marker;
pub mod metrics;
pub mod proxy;

pub use config::Config;
pub use error::ProxyError;
pub use grpc::{CallInfo, Interceptor, ServerStream};
pub use proxy::ProxyServer;
