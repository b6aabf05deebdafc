//! TLS vs plaintext detection on the first bytes of a connection.
//!
//! A TLS connection opens with a handshake record: content type `0x16`
//! followed by the record's major protocol version `0x03`. Anything else is
//! treated as plaintext HTTP (HTTP/1.x request line or the HTTP/2 preface).

use super::prefixed::PrefixedIo;
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const TLS_HANDSHAKE_RECORD: u8 = 0x16;
const TLS_MAJOR_VERSION: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Tls,
    Plaintext,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Tls => "tls",
            Classification::Plaintext => "plaintext",
        }
    }
}

/// Classify a connection from the bytes seen so far, or `None` if more are needed.
pub fn classify_prefix(prefix: &[u8]) -> Option<Classification> {
    match prefix {
        [] | [TLS_HANDSHAKE_RECORD] => None,
        [TLS_HANDSHAKE_RECORD, TLS_MAJOR_VERSION, ..] => Some(Classification::Tls),
        _ => Some(Classification::Plaintext),
    }
}

/// Read just enough of `io` to classify it.
///
/// The bytes read are not lost: the returned stream yields them again before
/// anything else. Fails with `UnexpectedEof` if the peer closes first.
pub async fn classify<S>(mut io: S) -> io::Result<(Classification, PrefixedIo<S>)>
where
    S: AsyncRead + Unpin,
{
    let mut peeked = BytesMut::with_capacity(16);
    loop {
        if let Some(classification) = classify_prefix(&peeked) {
            return Ok((classification, PrefixedIo::new(peeked.freeze(), io)));
        }
        if io.read_buf(&mut peeked).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before it could be classified",
            ));
        }
    }
}
