//! Encoding call statuses as `grpc-status` / `grpc-message` metadata.

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::{Code, Status};

pub static GRPC_STATUS: HeaderName = HeaderName::from_static("grpc-status");
pub static GRPC_MESSAGE: HeaderName = HeaderName::from_static("grpc-message");

/// Metadata entry holding a wire code that [`Code`] has no variant for.
const RAW_CODE_KEY: &str = "grpc-status";

/// Build a status from a numeric wire code, keeping codes outside the
/// range of [`Code`] intact. Such statuses report `Unknown` from
/// [`Status::code`] but go out with their original `grpc-status`.
pub fn status_from_code(code: i32, message: impl Into<String>) -> Status {
    let known = Code::from_i32(code);
    if i32::from(known) == code {
        return Status::new(known, message);
    }
    let mut metadata = MetadataMap::new();
    metadata.insert(RAW_CODE_KEY, MetadataValue::from(code));
    Status::with_metadata(Code::Unknown, message, metadata)
}

/// The `grpc-status` value a status is sent with.
pub fn wire_code(status: &Status) -> i32 {
    status
        .metadata()
        .get(RAW_CODE_KEY)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| i32::from(status.code()))
}

/// Status headers for the end of a call.
pub fn status_headers(status: &Status) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        GRPC_STATUS.clone(),
        HeaderValue::from(wire_code(status)),
    );
    if !status.message().is_empty() {
        // Percent-encoded output is always a valid header value
        if let Ok(value) = HeaderValue::from_str(&urlencoding::encode(status.message())) {
            headers.insert(GRPC_MESSAGE.clone(), value);
        }
    }
    headers
}

/// The same metadata as an HTTP/1-style header block, as gRPC-Web carries
/// it inside the trailer frame.
pub fn status_trailer_block(status: &Status) -> Vec<u8> {
    let mut block = Vec::new();
    for (name, value) in status_headers(status).iter() {
        block.extend_from_slice(name.as_str().as_bytes());
        block.push(b':');
        block.extend_from_slice(value.as_bytes());
        block.extend_from_slice(b"\r\n");
    }
    block
}

/// Read a status back out of response metadata. Missing or unparsable
/// `grpc-status` reads as `Unknown`.
pub fn status_from_headers(headers: &HeaderMap) -> Status {
    let code = headers
        .get(&GRPC_STATUS)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(Code::Unknown as i32);
    let message = headers
        .get(&GRPC_MESSAGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
        .unwrap_or_default();
    status_from_code(code, message)
}
