//! Passthrough forwarding of non-gRPC requests to their original destination.

use super::client::HttpClient;
use super::headers::{append_forwarded_for, strip_hop_by_hop};
use super::response_ext::{error_response, ProxyBody};
use crate::marker::is_secure_marked;
use crate::metrics;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Response, StatusCode, Uri, Version};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, error};

/// Rebuild the destination URI of a request the client meant for someone else.
///
/// The scheme comes from the secure marker, the authority from `Host`
/// (falling back to the request target's authority, as HTTP/2 carries it),
/// and path and query are kept as sent.
pub fn passthrough_uri<B>(req: &Request<B>) -> Option<Uri> {
    let scheme = if is_secure_marked(req.headers()) {
        "https"
    } else {
        "http"
    };
    let host = req
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.as_str().to_string()))?;
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Uri::builder()
        .scheme(scheme)
        .authority(host.as_str())
        .path_and_query(path)
        .build()
        .ok()
}

/// Forward a request with streaming body (no buffering).
pub async fn forward_passthrough<B>(
    http_client: &HttpClient,
    req: Request<B>,
    peer: Option<SocketAddr>,
) -> Response<ProxyBody>
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    let Some(uri) = passthrough_uri(&req) else {
        debug!("Rejecting request without a destination host: {}", req.uri());
        return error_response(StatusCode::BAD_REQUEST, "Missing Host header");
    };
    let scheme = uri.scheme_str().unwrap_or("http").to_string();

    let (mut parts, body) = req.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    if !parts.headers.contains_key(HOST) {
        if let Some(value) = uri
            .authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        {
            parts.headers.insert(HOST, value);
        }
    }
    if let Some(peer) = peer {
        append_forwarded_for(&mut parts.headers, peer);
    }

    debug!("Forwarding (streaming) {} {}", parts.method, uri);
    parts.uri = uri;
    parts.version = Version::HTTP_11;

    // Pass request body through directly without buffering
    let upstream_req = Request::from_parts(parts, BoxBody::new(body));

    let start = Instant::now();
    match http_client.request(upstream_req).await {
        Ok(upstream_response) => {
            let (mut parts, body) = upstream_response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            metrics::record_passthrough(
                &scheme,
                parts.status.as_u16(),
                start.elapsed().as_secs_f64() * 1000.0,
            );
            Response::from_parts(parts, BoxBody::new(body))
        }
        Err(e) => {
            error!("Failed to forward request to upstream: {}", e);
            metrics::record_passthrough(&scheme, 502, start.elapsed().as_secs_f64() * 1000.0);
            error_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::set_secure_marker;

    #[test]
    fn test_plain_request_uses_http() {
        let req = Request::get("/v1/items?page=2")
            .header(HOST, "api.example.com")
            .body(())
            .unwrap();
        let uri = passthrough_uri(&req).unwrap();
        assert_eq!(uri, "http://api.example.com/v1/items?page=2");
    }

    #[test]
    fn test_marked_request_uses_https() {
        let mut req = Request::get("/").header(HOST, "example.com").body(()).unwrap();
        set_secure_marker(req.headers_mut());
        assert_eq!(passthrough_uri(&req).unwrap(), "https://example.com/");
    }

    #[test]
    fn test_authority_fallback() {
        let req = Request::get("https://example.com:8443/health")
            .version(Version::HTTP_2)
            .body(())
            .unwrap();
        assert_eq!(
            passthrough_uri(&req).unwrap(),
            "http://example.com:8443/health"
        );
    }

    #[test]
    fn test_missing_host() {
        let req = Request::get("/").body(()).unwrap();
        assert!(passthrough_uri(&req).is_none());
    }
}
