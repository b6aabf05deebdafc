//! Prometheus metrics for fixture replay.
//!
//! Registered in the default registry, so the proxy's `/metrics` endpoint
//! serves them next to its own.
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    /// Replay lookups by outcome
    pub static ref REPLAY_OUTCOMES_TOTAL: CounterVec = register_counter_vec!(
        "grpc_fixture_replay_outcomes_total",
        "Total number of fixture replay lookups by outcome",
        &["outcome"]  // outcome: replayed|recorded_error|unknown_method|not_unary|no_match|bad_request
    )
    .unwrap();
}

pub fn record_replay(outcome: &str) {
    REPLAY_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}
