//! Prometheus metrics for the intercepting proxy.
//!
//! Tracks connection classification, request routing, passthrough traffic
//! and gRPC call outcomes.
use crate::proxy::{error_response, ProxyBody, ResponseExt};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

lazy_static! {
    /// Connections entering the serve loop
    pub static ref CONNECTIONS_TOTAL: CounterVec = register_counter_vec!(
        "grpc_proxy_connections_total",
        "Total number of connections classified by the proxy",
        &["classification", "source"]  // classification: tls|plaintext|failed, source: accepted|redirected
    )
    .unwrap();

    /// Requests per router decision
    pub static ref REQUESTS_ROUTED_TOTAL: CounterVec = register_counter_vec!(
        "grpc_proxy_requests_routed_total",
        "Total number of requests by route",
        &["route"]  // route: connect|grpc_web_preflight|grpc_web|grpc|passthrough
    )
    .unwrap();

    /// Passthrough responses by upstream status
    pub static ref PASSTHROUGH_RESPONSES_TOTAL: CounterVec = register_counter_vec!(
        "grpc_proxy_passthrough_responses_total",
        "Total number of passthrough responses by status",
        &["scheme", "status"]
    )
    .unwrap();

    /// Upstream request duration for passthrough traffic
    pub static ref PASSTHROUGH_DURATION_MS: HistogramVec = register_histogram_vec!(
        "grpc_proxy_passthrough_duration_ms",
        "Duration of passthrough upstream requests in milliseconds",
        &["scheme"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Completed gRPC calls by final status code
    pub static ref GRPC_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "grpc_proxy_calls_total",
        "Total number of gRPC calls by protocol and status code",
        &["protocol", "code"]  // protocol: grpc|grpc-web
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_connection(classification: &str, redirected: bool) {
    let source = if redirected { "redirected" } else { "accepted" };
    CONNECTIONS_TOTAL
        .with_label_values(&[classification, source])
        .inc();
}

pub fn record_route(route: &str) {
    REQUESTS_ROUTED_TOTAL.with_label_values(&[route]).inc();
}

pub fn record_passthrough(scheme: &str, status: u16, duration_ms: f64) {
    PASSTHROUGH_RESPONSES_TOTAL
        .with_label_values(&[scheme, &status.to_string()])
        .inc();
    PASSTHROUGH_DURATION_MS
        .with_label_values(&[scheme])
        .observe(duration_ms);
}

/// `code` is the `grpc-status` the call ended with.
pub fn record_grpc_call(protocol: &str, code: i32) {
    GRPC_CALLS_TOTAL
        .with_label_values(&[protocol, &code.to_string()])
        .inc();
}

/// Serves `GET /metrics` on its own port.
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics available on http://{}/metrics", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                let service = service_fn(|req| async move { Ok::<_, Infallible>(serve_metrics(req)) });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Metrics connection error: {}", e);
                }
            });
        }
    }
}

fn serve_metrics<B>(req: Request<B>) -> Response<ProxyBody> {
    if req.method() != Method::GET || req.uri().path() != "/metrics" {
        return error_response(StatusCode::NOT_FOUND, "Not Found");
    }
    let mut response = Response::new(Full::new(Bytes::from(collect_metrics())));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response.into_boxed()
}
