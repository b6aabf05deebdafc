//! Replays recorded responses in place of a live backend.

use crate::metrics::record_replay;
use crate::store::FixtureStore;
use crate::types::MethodKey;
use async_trait::async_trait;
use grpc_proxy::{CallInfo, Interceptor, ServerStream};
use std::sync::Arc;
use tonic::Status;
use tracing::debug;

/// Serves every call from a [`FixtureStore`].
///
/// Only unary calls are replayed: the request bytes must match a recorded
/// request exactly, and the recorded response or failure is returned as is.
pub struct FixtureInterceptor {
    store: Arc<FixtureStore>,
    dump_unary_keys: bool,
}

impl FixtureInterceptor {
    pub fn new(store: Arc<FixtureStore>) -> Self {
        Self {
            store,
            dump_unary_keys: false,
        }
    }

    /// Log every recorded request of a method at debug level before
    /// looking a request up.
    pub fn with_key_dump(mut self, enabled: bool) -> Self {
        self.dump_unary_keys = enabled;
        self
    }
}

#[async_trait]
impl Interceptor for FixtureInterceptor {
    async fn intercept(&self, info: &CallInfo, stream: &mut dyn ServerStream) -> Result<(), Status> {
        let Some(key) = MethodKey::from_full_method(&info.full_method) else {
            record_replay("bad_request");
            return Err(Status::unimplemented("malformed method name"));
        };

        if self.store.recorded(&key).is_empty() {
            record_replay("unknown_method");
            return Err(Status::unavailable("no saved responses found for method"));
        }

        let Some(requests) = self.store.unary_requests(&key) else {
            record_replay("not_unary");
            return Err(Status::unimplemented("non-unary methods not yet implemented"));
        };

        let Some(request) = stream.recv_msg().await? else {
            record_replay("bad_request");
            return Err(Status::internal("call ended before a request message was received"));
        };

        if self.dump_unary_keys {
            for recorded in requests.keys() {
                debug!(method = %key, request = ?recorded, "recorded unary request");
            }
        }

        let Some(rpc) = requests.get(&request[..]) else {
            record_replay("no_match");
            return Err(Status::unavailable(format!(
                "no matching saved response for request {}",
                String::from_utf8_lossy(&request)
            )));
        };

        let status = rpc.status();
        if !status.is_ok() {
            record_replay("recorded_error");
            return Err(status.to_status());
        }

        let response = rpc
            .response()
            .cloned()
            .ok_or_else(|| Status::internal("recorded interaction has no response message"))?;
        stream.send_msg(response).await?;
        record_replay("replayed");
        Ok(())
    }
}
