//! The connection type carried through the accept pipeline.

use super::{BoxedIo, Io};
use crate::marker::Markable;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A pipeline connection: any byte stream plus whether its client side was TLS.
///
/// Only `MarkedConn` can be queued for serving, so every connection the
/// router sees is able to carry the scheme marker.
pub struct MarkedConn {
    io: BoxedIo,
    secure: bool,
}

impl MarkedConn {
    pub fn new<I: Io>(io: I) -> Self {
        Self {
            io: Box::new(io),
            secure: false,
        }
    }

    pub fn into_inner(self) -> BoxedIo {
        self.io
    }
}

impl Markable for MarkedConn {
    fn mark_secure(&mut self) {
        self.secure = true;
    }

    fn is_secure(&self) -> bool {
        self.secure
    }
}

impl std::fmt::Debug for MarkedConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkedConn")
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for MarkedConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MarkedConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_new_connection_is_insecure() {
        let (_client, server) = tokio::io::duplex(8);
        let conn = MarkedConn::new(server);
        assert!(!conn.is_secure());
    }

    #[test]
    fn test_mark_secure() {
        let (_client, server) = tokio::io::duplex(8);
        let mut conn = MarkedConn::new(server);
        conn.mark_secure();
        assert!(conn.is_secure());
    }

    #[tokio::test]
    async fn test_delegates_io() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut conn = MarkedConn::new(server);

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        conn.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}
