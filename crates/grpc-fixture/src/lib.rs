//! Fixture replay for the intercepting gRPC proxy.
//!
//! Recorded interactions are loaded from JSON-lines dumps into a
//! [`FixtureStore`], and a [`FixtureInterceptor`] answers every gRPC call
//! the proxy receives from that store.

pub mod config;
pub mod error;
pub mod interceptor;
pub mod loader;
pub mod metrics;
pub mod store;
pub mod types;

pub use config::FixtureConfig;
pub use error::FixtureError;
pub use interceptor::FixtureInterceptor;
pub use loader::{load_fixture_file, load_fixture_files, parse_fixtures};
pub use store::FixtureStore;
pub use types::{MessageOrigin, MethodKey, RecordedMessage, RecordedRpc, RecordedStatus};
