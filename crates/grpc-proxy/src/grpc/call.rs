//! Server side of a single call: opaque request messages in, response
//! messages out.

use super::framing::MessageDecoder;
use super::ServerStream;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use tonic::Status;

/// A call reading framed messages off an HTTP request body.
///
/// Response messages are collected and written out by the handler once the
/// interceptor has finished with the call.
pub struct GrpcCall<B> {
    body: B,
    decoder: MessageDecoder,
    body_done: bool,
    responses: Vec<Bytes>,
}

impl<B> GrpcCall<B> {
    pub fn new(body: B, max_message_len: usize) -> Self {
        Self {
            body,
            decoder: MessageDecoder::new(max_message_len),
            body_done: false,
            responses: Vec::new(),
        }
    }

    pub fn into_responses(self) -> Vec<Bytes> {
        self.responses
    }
}

#[async_trait]
impl<B> ServerStream for GrpcCall<B>
where
    B: Body<Data = Bytes> + Send + Unpin,
    B::Error: std::fmt::Display + Send,
{
    async fn recv_msg(&mut self) -> Result<Option<Bytes>, Status> {
        loop {
            if let Some(message) = self.decoder.decode()? {
                return Ok(Some(message));
            }
            if self.body_done {
                if self.decoder.has_partial() {
                    return Err(Status::internal(
                        "request stream ended in the middle of a message",
                    ));
                }
                return Ok(None);
            }
            match self.body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.decoder.extend(&data);
                    }
                }
                Some(Err(err)) => {
                    return Err(Status::cancelled(format!("request stream aborted: {err}")));
                }
                None => self.body_done = true,
            }
        }
    }

    async fn send_msg(&mut self, message: Bytes) -> Result<(), Status> {
        self.responses.push(message);
        Ok(())
    }
}
