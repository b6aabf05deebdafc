//! Length-prefixed message framing shared by gRPC and gRPC-Web.
//!
//! Each message is a 5-byte prefix (flag byte, big-endian u32 length)
//! followed by the payload. gRPC-Web reuses the layout for its trailer
//! frame, marked by the high bit of the flag byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tonic::Status;

pub const PREFIX_LEN: usize = 5;
pub const FLAG_COMPRESSED: u8 = 0x01;
pub const FLAG_TRAILERS: u8 = 0x80;

/// Frame one message payload.
pub fn encode_message(payload: &[u8]) -> Bytes {
    encode_frame(0, payload)
}

/// Frame a gRPC-Web trailer block.
pub fn encode_trailers(block: &[u8]) -> Bytes {
    encode_frame(FLAG_TRAILERS, block)
}

fn encode_frame(flag: u8, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(PREFIX_LEN + payload.len());
    out.put_u8(flag);
    out.put_u32(payload.len() as u32);
    out.put_slice(payload);
    out.freeze()
}

/// Incremental decoder for request messages.
#[derive(Debug)]
pub struct MessageDecoder {
    buf: BytesMut,
    max_message_len: usize,
}

impl MessageDecoder {
    pub fn new(max_message_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_message_len,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes buffered that do not yet form a complete message.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Pop the next complete message, if one is buffered.
    pub fn decode(&mut self) -> Result<Option<Bytes>, Status> {
        if self.buf.len() < PREFIX_LEN {
            return Ok(None);
        }

        let flag = self.buf[0];
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;

        if flag & FLAG_COMPRESSED != 0 {
            return Err(Status::unimplemented(
                "compressed request messages are not supported",
            ));
        }
        if flag != 0 {
            return Err(Status::internal(format!(
                "invalid message frame flag 0x{flag:02x}"
            )));
        }
        if len > self.max_message_len {
            return Err(Status::resource_exhausted(format!(
                "request message of {len} bytes exceeds the {} byte limit",
                self.max_message_len
            )));
        }
        if self.buf.len() < PREFIX_LEN + len {
            return Ok(None);
        }

        self.buf.advance(PREFIX_LEN);
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}
