//! gRPC and gRPC-Web call handling.
//!
//! Request and response messages are opaque bytes. The serving logic for a
//! call is supplied through the [`Interceptor`] trait; this module only deals
//! with framing, status metadata and the two HTTP encodings.

mod call;
pub mod framing;
mod service;
pub mod status;
pub mod web;

pub use call::GrpcCall;
pub use service::GrpcService;

use async_trait::async_trait;
use bytes::Bytes;
use tonic::Status;

/// Identity of the call being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    /// Full method path, `/<service>/<method>`.
    pub full_method: String,
}

impl CallInfo {
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
        }
    }
}

/// The server side of one call's message stream.
#[async_trait]
pub trait ServerStream: Send {
    /// Next request message, `None` once the client has finished sending.
    async fn recv_msg(&mut self) -> Result<Option<Bytes>, Status>;

    async fn send_msg(&mut self, message: Bytes) -> Result<(), Status>;
}

/// Serving logic invoked for every gRPC call the proxy receives.
///
/// Returning `Ok(())` completes the call with status OK after whatever
/// messages were sent; an error ends it with that status.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, info: &CallInfo, stream: &mut dyn ServerStream)
        -> Result<(), Status>;
}
