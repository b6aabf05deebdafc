//! Connection intake: classification, marking and the inbound queue.
//!
//! Every connection the proxy serves comes off a single [`InboundQueue`]:
//! the accept task pushes freshly accepted sockets, and the CONNECT tunnel
//! handler pushes hijacked connections back onto the same queue so they are
//! classified again as if newly accepted.
//!
//! # Module Structure
//!
//! - `prefixed` - stream wrapper that replays peeked bytes
//! - `classifier` - TLS vs plaintext detection on the first bytes
//! - `marked` - `MarkedConn`, the connection type carried through the pipeline
//! - `queue` - the inbound queue shared by the acceptor and the tunnel handler

mod classifier;
mod marked;
mod prefixed;
mod queue;

pub use classifier::{classify, classify_prefix, Classification};
pub use marked::MarkedConn;
pub use prefixed::PrefixedIo;
pub use queue::{inbound_queue, Inbound, InboundQueue, InboundReceiver, QueueClosed};

use tokio::io::{AsyncRead, AsyncWrite};

/// Byte stream the pipeline can carry: sockets, TLS streams, upgraded tunnels.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedIo = Box<dyn Io>;
