//! HTTP handlers turning gRPC and gRPC-Web requests into interceptor calls.

use super::framing::{encode_message, encode_trailers, PREFIX_LEN};
use super::status::{status_headers, status_trailer_block, wire_code};
use super::web::{
    apply_cors_headers, decode_text, encode_text, is_text_mode, preflight_headers,
    CONTENT_TYPE_WEB,
};
use super::{CallInfo, GrpcCall, Interceptor};
use crate::config::GrpcConfig;
use crate::metrics;
use crate::proxy::{empty_body, full_body, ProxyBody};
use bytes::{Bytes, BytesMut};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use std::error::Error as StdError;
use std::fmt::Display;
use std::sync::Arc;
use tonic::{Code, Status};
use tracing::debug;

const CONTENT_TYPE_GRPC: &str = "application/grpc";

/// Serves gRPC calls by handing them to an [`Interceptor`].
#[derive(Clone)]
pub struct GrpcService {
    interceptor: Arc<dyn Interceptor>,
    config: GrpcConfig,
}

impl GrpcService {
    pub fn new(interceptor: Arc<dyn Interceptor>, config: GrpcConfig) -> Self {
        Self {
            interceptor,
            config,
        }
    }

    pub fn config(&self) -> &GrpcConfig {
        &self.config
    }

    /// Serve a standard gRPC call over HTTP/2.
    ///
    /// Response messages go in the body and the status in trailers.
    pub async fn serve<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Display + Send,
    {
        let full_method = req.uri().path().to_string();
        let (messages, status) = self.run_call(full_method, req.into_body(), "grpc").await;

        let mut frames: Vec<Result<Frame<Bytes>, hyper::Error>> = messages
            .iter()
            .map(|message| Ok(Frame::data(encode_message(message))))
            .collect();
        frames.push(Ok(Frame::trailers(status_headers(&status))));

        let body = BoxBody::new(StreamBody::new(futures::stream::iter(frames)));
        let mut response = Response::new(body);
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_GRPC));
        response
    }

    /// Serve a gRPC-Web call. The status travels in a trailer frame at the
    /// end of the body, since browsers cannot read HTTP trailers.
    ///
    /// Binary bodies are decoded as they arrive. Text bodies must be
    /// buffered to undo the base64, so they are capped at one encoded
    /// message of `max_message_bytes`.
    pub async fn serve_web<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Into<Box<dyn StdError + Send + Sync>> + Display + Send,
    {
        let (parts, body) = req.into_parts();
        let text = is_text_mode(&parts.headers);
        let full_method = parts.uri.path().to_string();

        let (messages, status) = if text {
            let limit = text_body_limit(self.config.max_message_bytes);
            let body = match Limited::new(body, limit).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                    let status = Status::resource_exhausted(format!(
                        "gRPC-Web text body larger than {limit} bytes"
                    ));
                    return web_response(&parts.headers, text, &[], &status);
                }
                Err(e) => {
                    let status = Status::cancelled(format!("request stream aborted: {e}"));
                    return web_response(&parts.headers, text, &[], &status);
                }
            };
            let body = match decode_text(&body) {
                Ok(decoded) => decoded,
                Err(status) => return web_response(&parts.headers, text, &[], &status),
            };
            self.run_call(full_method, Full::new(body), "grpc-web").await
        } else {
            self.run_call(full_method, body, "grpc-web").await
        };
        web_response(&parts.headers, text, &messages, &status)
    }

    /// Answer a gRPC-Web CORS preflight.
    pub fn preflight<B>(&self, req: &Request<B>) -> Response<ProxyBody> {
        let mut response = Response::new(empty_body());
        *response.status_mut() = StatusCode::NO_CONTENT;
        *response.headers_mut() = preflight_headers(req.headers());
        response
    }

    async fn run_call<B>(
        &self,
        full_method: String,
        body: B,
        protocol: &str,
    ) -> (Vec<Bytes>, Status)
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Display + Send,
    {
        let info = CallInfo::new(full_method);
        let mut call = GrpcCall::new(body, self.config.max_message_bytes);

        let status = match self.interceptor.intercept(&info, &mut call).await {
            Ok(()) => Status::new(Code::Ok, ""),
            Err(status) => status,
        };
        debug!(
            "{} call {} finished with {:?}: {}",
            protocol,
            info.full_method,
            status.code(),
            status.message()
        );
        metrics::record_grpc_call(protocol, wire_code(&status));

        (call.into_responses(), status)
    }
}

/// Base64 length of one framed message of `max_message_bytes`.
fn text_body_limit(max_message_bytes: usize) -> usize {
    max_message_bytes
        .saturating_add(PREFIX_LEN)
        .div_ceil(3)
        .saturating_mul(4)
}

fn web_response(
    request_headers: &HeaderMap,
    text: bool,
    messages: &[Bytes],
    status: &Status,
) -> Response<ProxyBody> {
    let mut body = BytesMut::new();
    for message in messages {
        body.extend_from_slice(&encode_message(message));
    }
    body.extend_from_slice(&encode_trailers(&status_trailer_block(status)));
    let body = if text {
        encode_text(&body)
    } else {
        body.freeze()
    };

    let content_type = request_headers
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(CONTENT_TYPE_WEB));

    let mut response = Response::new(full_body(body));
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    apply_cors_headers(request_headers, response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::super::framing::FLAG_TRAILERS;
    use super::super::status::status_from_headers;
    use super::super::ServerStream;
    use super::*;
    use async_trait::async_trait;
    use hyper::header::{self, HeaderName};
    use futures::StreamExt;
    use hyper::Method;
    use std::convert::Infallible;
    use std::time::Duration;

    /// Answers every call with "Hello <request>", or NotFound for "nobody".
    struct Greeter;

    #[async_trait]
    impl Interceptor for Greeter {
        async fn intercept(
            &self,
            info: &CallInfo,
            stream: &mut dyn ServerStream,
        ) -> Result<(), Status> {
            assert_eq!(info.full_method, "/svc.Greeter/SayHello");
            let request = stream
                .recv_msg()
                .await?
                .ok_or_else(|| Status::internal("no request"))?;
            if request == "nobody" {
                return Err(Status::not_found("nobody home"));
            }
            let mut reply = b"Hello ".to_vec();
            reply.extend_from_slice(&request);
            stream.send_msg(Bytes::from(reply)).await
        }
    }

    fn service() -> GrpcService {
        GrpcService::new(Arc::new(Greeter), GrpcConfig::default())
    }

    fn request(content_type: &str, body: Bytes) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri("/svc.Greeter/SayHello")
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ORIGIN, "https://app.test")
            .body(Full::new(body))
            .unwrap()
    }

    async fn collect(response: Response<ProxyBody>) -> (Bytes, Option<HeaderMap>) {
        let collected = response.into_body().collect().await.unwrap();
        let trailers = collected.trailers().cloned();
        (collected.to_bytes(), trailers)
    }

    #[tokio::test]
    async fn test_grpc_response_carries_message_and_trailers() {
        let response = service()
            .serve(request("application/grpc", encode_message(b"Alice")))
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/grpc");

        let (body, trailers) = collect(response).await;
        assert_eq!(body, encode_message(b"Hello Alice"));
        let status = status_from_headers(&trailers.unwrap());
        assert_eq!(status.code(), Code::Ok);
    }

    #[tokio::test]
    async fn test_grpc_error_status_in_trailers() {
        let response = service()
            .serve(request("application/grpc", encode_message(b"nobody")))
            .await;

        let (body, trailers) = collect(response).await;
        assert!(body.is_empty());
        let status = status_from_headers(&trailers.unwrap());
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "nobody home");
    }

    #[tokio::test]
    async fn test_grpc_web_binary() {
        let response = service()
            .serve_web(request("application/grpc-web+proto", encode_message(b"Alice")))
            .await;
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/grpc-web+proto"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.test"
        );

        let (body, _) = collect(response).await;
        let message = encode_message(b"Hello Alice");
        assert_eq!(&body[..message.len()], &message[..]);

        let trailer = &body[message.len()..];
        assert_eq!(trailer[0], FLAG_TRAILERS);
        assert_eq!(&trailer[PREFIX_LEN..], b"grpc-status:0\r\n");
    }

    #[tokio::test]
    async fn test_grpc_web_text() {
        let encoded = encode_text(&encode_message(b"Alice"));
        let response = service()
            .serve_web(request("application/grpc-web-text", encoded))
            .await;

        let (body, _) = collect(response).await;
        let decoded = decode_text(&body).unwrap();
        assert!(decoded.starts_with(&encode_message(b"Hello Alice")));
    }

    #[tokio::test]
    async fn test_grpc_web_bad_text_body() {
        let response = service()
            .serve_web(request("application/grpc-web-text", Bytes::from_static(b"!!!!")))
            .await;

        let (body, _) = collect(response).await;
        let decoded = decode_text(&body).unwrap();
        assert_eq!(decoded[0], FLAG_TRAILERS);
        assert!(decoded.ends_with(b"\r\n"));
        let block = std::str::from_utf8(&decoded[PREFIX_LEN..]).unwrap();
        assert!(block.starts_with("grpc-status:3\r\n"));
    }

    fn small_service() -> GrpcService {
        let config = GrpcConfig {
            max_message_bytes: 1024,
            ..GrpcConfig::default()
        };
        GrpcService::new(Arc::new(Greeter), config)
    }

    /// Body that yields `head` and then stays open forever.
    fn endless_request(
        content_type: &str,
        head: Bytes,
    ) -> Request<impl Body<Data = Bytes, Error = Infallible> + Send + Unpin> {
        let frames = futures::stream::iter(vec![Ok(Frame::data(head))])
            .chain(futures::stream::pending());
        Request::builder()
            .method(Method::POST)
            .uri("/svc.Greeter/SayHello")
            .header(header::CONTENT_TYPE, content_type)
            .body(StreamBody::new(frames))
            .unwrap()
    }

    async fn trailer_status(response: Response<ProxyBody>, text: bool) -> Status {
        let (body, _) = collect(response).await;
        let body = if text { decode_text(&body).unwrap() } else { body };
        assert_eq!(body[0], FLAG_TRAILERS);
        let block = std::str::from_utf8(&body[PREFIX_LEN..]).unwrap();
        let code = block
            .lines()
            .find_map(|line| line.strip_prefix("grpc-status:"))
            .unwrap();
        Status::new(Code::from_i32(code.trim().parse().unwrap()), "")
    }

    #[tokio::test]
    async fn test_grpc_web_oversized_message_rejected_without_waiting_for_body() {
        // Declares a 1 MiB message and never sends it
        let head = Bytes::from_static(&[0, 0, 0x10, 0, 0]);
        let response = tokio::time::timeout(
            Duration::from_secs(2),
            small_service().serve_web(endless_request("application/grpc-web+proto", head)),
        )
        .await
        .expect("binary gRPC-Web call should not wait for the whole body");

        let status = trailer_status(response, false).await;
        assert_eq!(status.code(), Code::ResourceExhausted);
    }

    #[tokio::test]
    async fn test_grpc_web_text_body_is_capped() {
        let head = Bytes::from(vec![b'A'; 4096]);
        let response = tokio::time::timeout(
            Duration::from_secs(2),
            small_service().serve_web(endless_request("application/grpc-web-text", head)),
        )
        .await
        .expect("text body over the cap should be refused while still open");

        let status = trailer_status(response, true).await;
        assert_eq!(status.code(), Code::ResourceExhausted);
    }

    #[test]
    fn test_text_body_limit_covers_one_message() {
        let max = 1024;
        let encoded = encode_text(&encode_message(&vec![7u8; max]));
        assert!(encoded.len() <= text_body_limit(max));
        assert_eq!(text_body_limit(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_preflight_response() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/svc.Greeter/SayHello")
            .header(header::ORIGIN, "https://app.test")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-grpc-web")
            .body(())
            .unwrap();

        let response = service().preflight(&req);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[HeaderName::from_static("access-control-allow-headers")],
            "x-grpc-web"
        );
    }
}
