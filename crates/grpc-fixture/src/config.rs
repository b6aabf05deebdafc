//! Configuration for the fixture server: the proxy's own settings plus
//! where to find fixtures.

use crate::error::FixtureError;
use grpc_proxy::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FixtureConfig {
    #[serde(flatten)]
    pub proxy: Config,

    #[serde(default)]
    pub fixtures: FixturesConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FixturesConfig {
    /// Fixture dumps to load, in order
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    /// Log the recorded requests of a unary method on every lookup
    #[serde(default)]
    pub dump_unary_keys: bool,
}

impl FixtureConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: FixtureConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.proxy.validate()?;
        if self.fixtures.paths.is_empty() {
            return Err(FixtureError::Config(
                "at least one fixture file is required ('fixtures.paths' or --fixture)".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_flattened_proxy_settings() {
        let yaml = r#"
listen:
  host: 127.0.0.1
  port: 16353
grpc:
  cors_allowed_origins: ["https://app.test"]
fixtures:
  paths: [dump.json, more.json]
diagnostics:
  dump_unary_keys: true
"#;
        let config: FixtureConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.proxy.listen.port, 16353);
        assert_eq!(config.proxy.grpc.cors_allowed_origins, vec!["https://app.test"]);
        assert_eq!(config.fixtures.paths.len(), 2);
        assert!(config.diagnostics.dump_unary_keys);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_requires_fixtures() {
        let config = FixtureConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fixture"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.yaml");
        std::fs::write(&path, "fixtures:\n  paths: [dump.json]\n").unwrap();

        let config = FixtureConfig::from_file(&path).unwrap();
        assert_eq!(config.fixtures.paths, vec![PathBuf::from("dump.json")]);
        assert_eq!(config.proxy.listen.port, 0);
    }
}
