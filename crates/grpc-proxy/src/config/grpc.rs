//! gRPC and gRPC-Web serving options.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GrpcConfig {
    /// Largest request message accepted from a caller
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Origins allowed to issue gRPC-Web requests from a browser.
    /// Empty means every origin is accepted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_allowed_origins: Vec<String>,
}

impl GrpcConfig {
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.cors_allowed_origins.is_empty()
            || self
                .cors_allowed_origins
                .iter()
                .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
    }
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn default_max_message_bytes() -> usize {
    16 * 1024 * 1024
}
