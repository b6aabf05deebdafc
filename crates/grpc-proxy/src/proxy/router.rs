//! Per-request protocol routing.

use super::client::HttpClient;
use super::forwarding::forward_passthrough;
use super::response_ext::ProxyBody;
use super::tunnel::handle_connect;
use crate::config::GrpcConfig;
use crate::grpc::web::{is_cors_preflight, is_grpc_web_request};
use crate::grpc::GrpcService;
use crate::listener::InboundQueue;
use crate::marker::set_secure_marker;
use crate::metrics;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::debug;

/// Where a request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Connect,
    GrpcWebPreflight,
    GrpcWeb,
    Grpc,
    Passthrough,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Connect => "connect",
            Route::GrpcWebPreflight => "grpc_web_preflight",
            Route::GrpcWeb => "grpc_web",
            Route::Grpc => "grpc",
            Route::Passthrough => "passthrough",
        }
    }
}

/// Standard gRPC: HTTP/2 with a gRPC content type.
pub fn is_grpc_request<B>(req: &Request<B>) -> bool {
    req.version() == Version::HTTP_2
        && req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|ct| ct.contains("application/grpc"))
            .unwrap_or(false)
}

/// Choose the route for a request. Earlier checks win.
pub fn classify_request<B>(req: &Request<B>, grpc: &GrpcConfig) -> Route {
    if req.method() == Method::CONNECT {
        Route::Connect
    } else if is_cors_preflight(req, grpc) {
        Route::GrpcWebPreflight
    } else if is_grpc_web_request(req) {
        Route::GrpcWeb
    } else if is_grpc_request(req) {
        Route::Grpc
    } else {
        Route::Passthrough
    }
}

/// Facts about the connection a request arrived on.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub secure: bool,
    pub peer: Option<SocketAddr>,
}

/// Dispatches requests to the tunnel handler, the gRPC handlers or the
/// passthrough proxy.
pub struct Router {
    grpc: GrpcService,
    http_client: HttpClient,
    queue: InboundQueue,
}

impl Router {
    pub fn new(grpc: GrpcService, http_client: HttpClient, queue: InboundQueue) -> Self {
        Self {
            grpc,
            http_client,
            queue,
        }
    }

    pub async fn handle(
        &self,
        mut req: Request<Incoming>,
        conn: ConnectionInfo,
    ) -> Result<Response<ProxyBody>, Infallible> {
        if conn.secure {
            set_secure_marker(req.headers_mut());
        }

        let route = classify_request(&req, self.grpc.config());
        debug!("{} {} {:?} -> {}", req.method(), req.uri(), req.version(), route.as_str());
        metrics::record_route(route.as_str());

        let response = match route {
            Route::Connect => handle_connect(req, &self.queue, conn.peer),
            Route::GrpcWebPreflight => self.grpc.preflight(&req),
            Route::GrpcWeb => self.grpc.serve_web(req).await,
            Route::Grpc => self.grpc.serve(req).await,
            Route::Passthrough => forward_passthrough(&self.http_client, req, conn.peer).await,
        };
        Ok(response)
    }
}
