//! Configuration types for the intercepting proxy.

mod grpc;
mod listen;
mod upstream;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

pub use grpc::GrpcConfig;
pub use listen::{ListenConfig, MetricsConfig, TlsConfig};
pub use upstream::{ConnectionPoolConfig, UpstreamConfig};

/// Proxy configuration. Every section has defaults, so an empty document is valid.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    /// TLS termination for intercepted connections. Without it, TLS
    /// connections are dropped after classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub grpc: GrpcConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ProxyError> {
        if let Some(ref tls) = self.tls {
            if tls.cert_path.is_empty() || tls.key_path.is_empty() {
                return Err(ProxyError::Config(
                    "TLS termination requires both 'tls.cert_path' and 'tls.key_path'".to_string(),
                ));
            }
        }

        if self.listen.classify_timeout_ms == 0 {
            return Err(ProxyError::Config(
                "'listen.classify_timeout_ms' must be greater than zero".to_string(),
            ));
        }

        if self.grpc.max_message_bytes == 0 {
            return Err(ProxyError::Config(
                "'grpc.max_message_bytes' must be greater than zero".to_string(),
            ));
        }

        if self.metrics.enabled && self.metrics.port == self.listen.port && self.listen.port != 0 {
            return Err(ProxyError::Config(format!(
                "metrics port {} collides with the proxy listener",
                self.metrics.port
            )));
        }

        Ok(())
    }
}
