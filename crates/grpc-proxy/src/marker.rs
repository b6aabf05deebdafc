//! Scheme marker carried on request metadata.
//!
//! Every connection re-enters the pipeline as plaintext once TLS has been
//! terminated locally, so the only record of the original scheme is the
//! marker attached when the connection was accepted. The marker is a
//! `Forwarded: proto=https` element, which also reads correctly to upstreams
//! that understand RFC 7239.

use hyper::header::{HeaderMap, HeaderValue, FORWARDED};

static HTTPS_MARKER: HeaderValue = HeaderValue::from_static("proto=https");

/// Capability every connection flowing through the accept pipeline has:
/// it remembers whether the client side of it was TLS.
pub trait Markable {
    fn mark_secure(&mut self);
    fn is_secure(&self) -> bool;
}

/// Attach the secure marker to a request's headers.
pub fn set_secure_marker(headers: &mut HeaderMap) {
    if !is_secure_marked(headers) {
        headers.append(FORWARDED, HTTPS_MARKER.clone());
    }
}

/// Whether the request was marked as having arrived over TLS.
pub fn is_secure_marked(headers: &HeaderMap) -> bool {
    headers
        .get_all(FORWARDED)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split([',', ';']))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| {
            name.trim().eq_ignore_ascii_case("proto")
                && value.trim().trim_matches('"').eq_ignore_ascii_case("https")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmarked_headers() {
        let headers = HeaderMap::new();
        assert!(!is_secure_marked(&headers));
    }

    #[test]
    fn test_set_and_read_marker() {
        let mut headers = HeaderMap::new();
        set_secure_marker(&mut headers);
        assert!(is_secure_marked(&headers));
        assert_eq!(headers.get(FORWARDED).unwrap(), "proto=https");
    }

    #[test]
    fn test_marker_is_not_duplicated() {
        let mut headers = HeaderMap::new();
        set_secure_marker(&mut headers);
        set_secure_marker(&mut headers);
        assert_eq!(headers.get_all(FORWARDED).iter().count(), 1);
    }

    #[test]
    fn test_marker_among_other_forwarded_elements() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED,
            HeaderValue::from_static("for=192.0.2.60;proto=\"HTTPS\";by=203.0.113.43"),
        );
        assert!(is_secure_marked(&headers));
    }

    #[test]
    fn test_http_proto_is_not_secure() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED, HeaderValue::from_static("proto=http"));
        assert!(!is_secure_marked(&headers));
    }
}
