//! Replay behaviour of the fixture interceptor.
//!
//! The first group drives the interceptor with an in-memory call; the last
//! tests run it behind a real proxy and talk gRPC over cleartext HTTP/2.

use async_trait::async_trait;
use bytes::Bytes;
use grpc_fixture::{
    load_fixture_files, FixtureInterceptor, FixtureStore, RecordedMessage, RecordedRpc,
    RecordedStatus,
};
use grpc_proxy::grpc::framing::encode_message;
use grpc_proxy::grpc::status::status_from_headers;
use grpc_proxy::{CallInfo, Config, Interceptor, ProxyServer, ServerStream};
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::collections::VecDeque;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tonic::{Code, Status};

/// In-memory call: queued request results in, sent messages collected.
#[derive(Default)]
struct TestCall {
    requests: VecDeque<Result<Bytes, Status>>,
    sent: Vec<Bytes>,
}

impl TestCall {
    fn with_request(payload: &'static str) -> Self {
        let mut call = Self::default();
        call.requests.push_back(Ok(Bytes::from_static(payload.as_bytes())));
        call
    }
}

#[async_trait]
impl ServerStream for TestCall {
    async fn recv_msg(&mut self) -> Result<Option<Bytes>, Status> {
        self.requests.pop_front().transpose()
    }

    async fn send_msg(&mut self, message: Bytes) -> Result<(), Status> {
        self.sent.push(message);
        Ok(())
    }
}

fn greeter_rpc(method: &str, messages: Vec<RecordedMessage>, error: Option<RecordedStatus>) -> RecordedRpc {
    RecordedRpc {
        service: "svc.Greeter".to_string(),
        method: method.to_string(),
        messages,
        error,
    }
}

fn greeter_store() -> Arc<FixtureStore> {
    Arc::new(FixtureStore::new(vec![
        greeter_rpc(
            "SayHello",
            vec![RecordedMessage::client("Alice"), RecordedMessage::server("Hello Alice")],
            None,
        ),
        greeter_rpc(
            "SayHello",
            vec![RecordedMessage::client("Mallory")],
            Some(RecordedStatus::new(Code::PermissionDenied, "Mallory is not welcome")),
        ),
        greeter_rpc(
            "StreamHellos",
            vec![
                RecordedMessage::client("Alice"),
                RecordedMessage::server("Hello"),
                RecordedMessage::server("Alice"),
            ],
            None,
        ),
    ]))
}

async fn call(method: &str, call: &mut TestCall) -> Result<(), Status> {
    let interceptor = FixtureInterceptor::new(greeter_store()).with_key_dump(true);
    interceptor.intercept(&CallInfo::new(method), call).await
}

#[tokio::test]
async fn test_recorded_request_replays_response() {
    let mut test_call = TestCall::with_request("Alice");
    call("/svc.Greeter/SayHello", &mut test_call).await.unwrap();
    assert_eq!(test_call.sent, vec![Bytes::from_static(b"Hello Alice")]);
}

#[tokio::test]
async fn test_replay_is_idempotent() {
    for _ in 0..3 {
        let mut test_call = TestCall::with_request("Alice");
        call("/svc.Greeter/SayHello", &mut test_call).await.unwrap();
        assert_eq!(test_call.sent, vec![Bytes::from_static(b"Hello Alice")]);
    }
}

#[tokio::test]
async fn test_unknown_request_is_unavailable() {
    let mut test_call = TestCall::with_request("Bob");
    let status = call("/svc.Greeter/SayHello", &mut test_call).await.unwrap_err();

    assert_eq!(status.code(), Code::Unavailable);
    assert_eq!(status.message(), "no matching saved response for request Bob");
    assert!(test_call.sent.is_empty());
}

#[tokio::test]
async fn test_unknown_method_is_unavailable() {
    let mut test_call = TestCall::with_request("Alice");
    let status = call("/svc.Greeter/SayBye", &mut test_call).await.unwrap_err();

    assert_eq!(status.code(), Code::Unavailable);
    assert_eq!(status.message(), "no saved responses found for method");
    // Rejected before the request was read
    assert_eq!(test_call.requests.len(), 1);
}

#[tokio::test]
async fn test_streaming_method_is_unimplemented() {
    let mut test_call = TestCall::with_request("Alice");
    let status = call("/svc.Greeter/StreamHellos", &mut test_call)
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unimplemented);
    assert_eq!(status.message(), "non-unary methods not yet implemented");
}

#[tokio::test]
async fn test_recorded_failure_is_replayed() {
    let mut test_call = TestCall::with_request("Mallory");
    let status = call("/svc.Greeter/SayHello", &mut test_call).await.unwrap_err();

    assert_eq!(status.code(), Code::PermissionDenied);
    assert_eq!(status.message(), "Mallory is not welcome");
    assert!(test_call.sent.is_empty());
}

#[tokio::test]
async fn test_malformed_method_name() {
    let mut test_call = TestCall::with_request("Alice");
    let status = call("svc.Greeter.SayHello", &mut test_call).await.unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);
    assert_eq!(status.message(), "malformed method name");
}

#[tokio::test]
async fn test_transport_failure_skips_lookup() {
    let mut test_call = TestCall::default();
    test_call
        .requests
        .push_back(Err(Status::cancelled("client went away")));

    let status = call("/svc.Greeter/SayHello", &mut test_call).await.unwrap_err();
    assert_eq!(status.code(), Code::Cancelled);
    assert!(test_call.sent.is_empty());
}

#[tokio::test]
async fn test_missing_request_message() {
    let mut test_call = TestCall::default();
    let status = call("/svc.Greeter/SayHello", &mut test_call).await.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
}

const GREETER_DUMP: &str = concat!(
    r#"{"service":"svc.Greeter","method":"SayHello","messages":[{"message_origin":"client","raw_message":"QWxpY2U="},{"message_origin":"server","raw_message":"SGVsbG8gQWxpY2U="}],"error":{"code":0,"message":""}}"#,
    "\n"
);

async fn start_fixture_proxy() -> SocketAddr {
    let mut dump = tempfile::NamedTempFile::new().unwrap();
    dump.write_all(GREETER_DUMP.as_bytes()).unwrap();
    let store = load_fixture_files(&[dump.path()]).unwrap();

    let mut config = Config::default();
    config.listen.host = "127.0.0.1".parse().unwrap();
    config.upstream.tls_skip_verify = true;

    let interceptor = FixtureInterceptor::new(Arc::new(store));
    let server = ProxyServer::bind(config, Arc::new(interceptor)).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn grpc_call(proxy: SocketAddr, method: &str, payload: &'static [u8]) -> (Bytes, Status) {
    let stream = TcpStream::connect(proxy).await.unwrap();
    let (mut sender, conn) =
        hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(stream))
            .await
            .unwrap();
    tokio::spawn(conn);

    let request = Request::post(format!("http://{proxy}{method}"))
        .header("content-type", "application/grpc+proto")
        .header("te", "trailers")
        .body(Full::new(encode_message(payload)))
        .unwrap();
    let response = sender.send_request(request).await.unwrap();
    assert_eq!(response.status(), 200);

    let collected = response.into_body().collect().await.unwrap();
    let status = status_from_headers(&collected.trailers().cloned().unwrap_or_default());
    (collected.to_bytes(), status)
}

#[tokio::test]
async fn test_replay_over_h2c() {
    let proxy = start_fixture_proxy().await;

    let (body, status) = grpc_call(proxy, "/svc.Greeter/SayHello", b"Alice").await;
    assert_eq!(status.code(), Code::Ok);
    assert_eq!(body, encode_message(b"Hello Alice"));

    let (body, status) = grpc_call(proxy, "/svc.Greeter/SayHello", b"Bob").await;
    assert!(body.is_empty());
    assert_eq!(status.code(), Code::Unavailable);
    assert!(status.message().contains("Bob"));

    let (_, status) = grpc_call(proxy, "/svc.Greeter/SayBye", b"Alice").await;
    assert_eq!(status.code(), Code::Unavailable);
    assert_eq!(status.message(), "no saved responses found for method");
}
