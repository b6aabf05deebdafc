//! CONNECT interception.
//!
//! Instead of dialing the requested target, the proxy acknowledges the
//! tunnel, takes the client connection over and feeds it back into its own
//! serve loop, where it is classified (and TLS-terminated) like any other
//! connection.

use super::response_ext::{empty_body, error_response, ProxyBody};
use crate::listener::{InboundQueue, MarkedConn};
use hyper::header::HOST;
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode, Version};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// The `host:port` a CONNECT request asks for.
pub fn connect_target<B>(req: &Request<B>) -> Option<String> {
    req.uri()
        .authority()
        .map(|authority| authority.as_str().to_string())
        .or_else(|| {
            req.headers()
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
}

/// Answer a CONNECT request and hand the connection to the redirect queue
/// once the acknowledgement has been written.
pub fn handle_connect<B>(
    mut req: Request<B>,
    queue: &InboundQueue,
    peer: Option<SocketAddr>,
) -> Response<ProxyBody> {
    let Some(target_host) = connect_target(&req) else {
        return error_response(StatusCode::BAD_REQUEST, "CONNECT request without a target");
    };
    let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
        warn!("Cannot take over connection for CONNECT {}", target_host);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Hijacking not supported");
    };

    let queue = queue.clone();
    tokio::spawn(async move {
        // Resolves once the 200 below has been flushed to the client
        match on_upgrade.await {
            Ok(upgraded) => {
                debug!("Intercepting CONNECT tunnel to {}", target_host);
                let conn = MarkedConn::new(TokioIo::new(upgraded));
                if queue.redirect(conn, target_host.clone(), peer).await.is_err() {
                    debug!("Dropping tunnel to {}: server shutting down", target_host);
                }
            }
            Err(e) => {
                warn!("Failed to take over CONNECT tunnel to {}: {}", target_host, e);
            }
        }
    });

    let mut response = Response::new(empty_body());
    if req.version() != Version::HTTP_2 && req.version() != Version::HTTP_3 {
        *response.version_mut() = Version::HTTP_10;
    }
    response
}
