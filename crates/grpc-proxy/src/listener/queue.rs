//! The inbound queue drained by the serve loop.

use super::marked::MarkedConn;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// A connection waiting to be classified and served.
#[derive(Debug)]
pub struct Inbound {
    pub conn: MarkedConn,
    /// Address of the client that opened the underlying TCP connection
    pub peer: Option<SocketAddr>,
    /// CONNECT target the connection was tunneled to, for redirected connections
    pub target_host: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("inbound queue closed")]
pub struct QueueClosed;

/// Producer side of the inbound queue. Cheap to clone.
#[derive(Clone)]
pub struct InboundQueue {
    tx: mpsc::Sender<Inbound>,
}

/// Consumer side of the inbound queue, owned by the serve loop.
pub struct InboundReceiver {
    rx: mpsc::Receiver<Inbound>,
}

pub fn inbound_queue(capacity: usize) -> (InboundQueue, InboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (InboundQueue { tx }, InboundReceiver { rx })
}

impl InboundQueue {
    /// Queue a freshly accepted connection.
    pub async fn accepted(&self, conn: MarkedConn, peer: SocketAddr) -> Result<(), QueueClosed> {
        self.push(Inbound {
            conn,
            peer: Some(peer),
            target_host: None,
        })
        .await
    }

    /// Feed a hijacked connection back into the pipeline as if newly accepted
    /// for `target_host`.
    pub async fn redirect(
        &self,
        conn: MarkedConn,
        target_host: impl Into<String>,
        peer: Option<SocketAddr>,
    ) -> Result<(), QueueClosed> {
        self.push(Inbound {
            conn,
            peer,
            target_host: Some(target_host.into()),
        })
        .await
    }

    async fn push(&self, inbound: Inbound) -> Result<(), QueueClosed> {
        self.tx.send(inbound).await.map_err(|_| QueueClosed)
    }
}

impl InboundReceiver {
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }
}
