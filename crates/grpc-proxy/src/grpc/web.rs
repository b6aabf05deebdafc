//! gRPC-Web request detection, CORS handling and the `-text` encoding.

use crate::config::GrpcConfig;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Method, Request};
use tonic::Status;

pub const CONTENT_TYPE_WEB: &str = "application/grpc-web";
pub const CONTENT_TYPE_WEB_TEXT: &str = "application/grpc-web-text";

const PREFLIGHT_MAX_AGE_SECS: &str = "600";
const EXPOSED_HEADERS: &str = "grpc-status,grpc-message";

/// Text-mode clients may pad every chunk they send, so padding is accepted
/// wherever a 4-character group ends.
const TEXT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
}

/// A gRPC-Web call: `POST` with any `application/grpc-web*` content type.
pub fn is_grpc_web_request<B>(req: &Request<B>) -> bool {
    req.method() == Method::POST
        && content_type(req.headers())
            .map(|ct| ct.starts_with(CONTENT_TYPE_WEB))
            .unwrap_or(false)
}

/// Whether the call uses the base64 `-text` variant.
pub fn is_text_mode(headers: &HeaderMap) -> bool {
    content_type(headers)
        .map(|ct| ct.starts_with(CONTENT_TYPE_WEB_TEXT))
        .unwrap_or(false)
}

/// A browser preflight for a gRPC-Web call from an allowed origin.
pub fn is_cors_preflight<B>(req: &Request<B>, config: &GrpcConfig) -> bool {
    if req.method() != Method::OPTIONS {
        return false;
    }
    let headers = req.headers();

    let requests_post = headers
        .get(header::ACCESS_CONTROL_REQUEST_METHOD)
        .map(|value| value.as_bytes().eq_ignore_ascii_case(b"POST"))
        .unwrap_or(false);
    let requests_grpc_web = headers
        .get_all(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|name| name.trim().eq_ignore_ascii_case("x-grpc-web"));
    let origin_ok = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(|origin| config.origin_allowed(origin))
        .unwrap_or(false);

    requests_post && requests_grpc_web && origin_ok
}

/// Headers answering a preflight request.
pub fn preflight_headers(request: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(origin) = request.get(header::ORIGIN) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST"),
    );
    if let Some(requested) = request.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
    );
    headers
}

/// CORS headers for an actual gRPC-Web response. Nothing is added when the
/// request carried no `Origin`.
pub fn apply_cors_headers(request: &HeaderMap, response: &mut HeaderMap) {
    let Some(origin) = request.get(header::ORIGIN) else {
        return;
    };
    response.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    response.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    response.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSED_HEADERS),
    );
}

/// Decode a complete `-text` request body.
pub fn decode_text(body: &[u8]) -> Result<Bytes, Status> {
    let chars: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    let mut out = Vec::with_capacity(chars.len() / 4 * 3);
    for group in chars.chunks(4) {
        let decoded = TEXT_ENGINE
            .decode(group)
            .map_err(|e| Status::invalid_argument(format!("invalid base64 request body: {e}")))?;
        out.extend_from_slice(&decoded);
    }
    Ok(Bytes::from(out))
}

/// Encode a complete `-text` response body.
pub fn encode_text(body: &[u8]) -> Bytes {
    Bytes::from(base64::engine::general_purpose::STANDARD.encode(body))
}
