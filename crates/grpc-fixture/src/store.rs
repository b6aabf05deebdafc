//! In-memory index of recorded interactions.

use crate::types::{MethodKey, RecordedRpc};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};

/// Recorded interactions indexed for replay. Built once, then read-only.
#[derive(Debug, Default)]
pub struct FixtureStore {
    /// Every recorded call, by method
    by_method: HashMap<MethodKey, Vec<RecordedRpc>>,
    /// Exact-match replay table for methods whose calls are all unary
    unary_by_request: HashMap<MethodKey, HashMap<Bytes, RecordedRpc>>,
}

impl FixtureStore {
    pub fn new(rpcs: impl IntoIterator<Item = RecordedRpc>) -> Self {
        let mut by_method: HashMap<MethodKey, Vec<RecordedRpc>> = HashMap::new();
        let mut unary_by_request: HashMap<MethodKey, HashMap<Bytes, RecordedRpc>> =
            HashMap::new();
        let mut streaming = HashSet::new();

        for rpc in rpcs {
            let key = rpc.key();
            match rpc.request() {
                Some(request) if rpc.is_unary() => {
                    // Later captures of the same request win
                    unary_by_request
                        .entry(key.clone())
                        .or_default()
                        .insert(request.clone(), rpc.clone());
                }
                _ => {
                    streaming.insert(key.clone());
                }
            }
            by_method.entry(key).or_default().push(rpc);
        }

        for key in &streaming {
            unary_by_request.remove(key);
        }

        Self {
            by_method,
            unary_by_request,
        }
    }

    /// All recorded calls for a method, in load order.
    pub fn recorded(&self, key: &MethodKey) -> &[RecordedRpc] {
        self.by_method.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The replay table of a unary method, `None` for methods that were
    /// never recorded or have non-unary calls.
    pub fn unary_requests(&self, key: &MethodKey) -> Option<&HashMap<Bytes, RecordedRpc>> {
        self.unary_by_request.get(key)
    }

    pub fn lookup_unary(&self, key: &MethodKey, request: &[u8]) -> Option<&RecordedRpc> {
        self.unary_by_request.get(key)?.get(request)
    }

    pub fn method_count(&self) -> usize {
        self.by_method.len()
    }

    pub fn unary_method_count(&self) -> usize {
        self.unary_by_request.len()
    }

    pub fn interaction_count(&self) -> usize {
        self.by_method.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordedMessage, RecordedStatus};
    use tonic::Code;

    fn unary(method: &str, request: &str, response: &str) -> RecordedRpc {
        RecordedRpc {
            service: "svc.Greeter".to_string(),
            method: method.to_string(),
            messages: vec![
                RecordedMessage::client(request.to_string()),
                RecordedMessage::server(response.to_string()),
            ],
            error: None,
        }
    }

    fn key(method: &str) -> MethodKey {
        MethodKey::new("svc.Greeter", method)
    }

    #[test]
    fn test_indexes_unary_calls() {
        let store = FixtureStore::new(vec![
            unary("SayHello", "Alice", "Hello Alice"),
            unary("SayHello", "Bob", "Hello Bob"),
        ]);

        assert_eq!(store.method_count(), 1);
        assert_eq!(store.interaction_count(), 2);
        assert_eq!(store.recorded(&key("SayHello")).len(), 2);
        let rpc = store.lookup_unary(&key("SayHello"), b"Bob").unwrap();
        assert_eq!(rpc.response().unwrap(), "Hello Bob");
        assert!(store.lookup_unary(&key("SayHello"), b"Carol").is_none());
    }

    #[test]
    fn test_unary_keys_are_recorded_methods() {
        let store = FixtureStore::new(vec![unary("SayHello", "Alice", "Hello Alice")]);
        for key in store.unary_by_request.keys() {
            assert!(!store.recorded(key).is_empty());
        }
    }

    #[test]
    fn test_last_capture_wins() {
        let store = FixtureStore::new(vec![
            unary("SayHello", "Alice", "first"),
            unary("SayHello", "Alice", "second"),
        ]);
        let rpc = store.lookup_unary(&key("SayHello"), b"Alice").unwrap();
        assert_eq!(rpc.response().unwrap(), "second");
    }

    #[test]
    fn test_one_streaming_call_disables_unary_replay() {
        let mut streaming = unary("SayHello", "Alice", "Hello Alice");
        streaming
            .messages
            .push(RecordedMessage::server("Hello again"));

        let store = FixtureStore::new(vec![unary("SayHello", "Bob", "Hello Bob"), streaming]);
        assert_eq!(store.recorded(&key("SayHello")).len(), 2);
        assert!(store.unary_requests(&key("SayHello")).is_none());
        assert_eq!(store.unary_method_count(), 0);
    }

    #[test]
    fn test_recorded_failure_is_unary() {
        let failed = RecordedRpc {
            service: "svc.Greeter".to_string(),
            method: "SayHello".to_string(),
            messages: vec![RecordedMessage::client("Mallory")],
            error: Some(RecordedStatus::new(Code::PermissionDenied, "go away")),
        };
        let store = FixtureStore::new(vec![failed]);
        let rpc = store.lookup_unary(&key("SayHello"), b"Mallory").unwrap();
        assert!(!rpc.status().is_ok());
    }

    #[test]
    fn test_unknown_method() {
        let store = FixtureStore::default();
        assert!(store.is_empty());
        assert!(store.recorded(&key("SayBye")).is_empty());
        assert!(store.unary_requests(&key("SayBye")).is_none());
    }
}
