//! grpc-fixture CLI
//!
//! Runs the intercepting proxy with every gRPC call answered from recorded
//! fixtures, so clients can be exercised without a live backend.
//!
//! Usage:
//!   grpc-fixture --fixture dump.json [OPTIONS]

use anyhow::Context;
use clap::Parser;
use grpc_fixture::{load_fixture_files, FixtureConfig, FixtureInterceptor};
use grpc_proxy::config::TlsConfig;
use grpc_proxy::ProxyServer;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Replay recorded gRPC interactions behind an intercepting proxy
#[derive(Parser, Debug)]
#[command(name = "grpc-fixture")]
#[command(author, version, about)]
struct Args {
    /// Fixture dump to replay (JSON lines); repeat to load several
    #[arg(short, long = "fixture", env = "GRPC_FIXTURE_FILES", value_delimiter = ',')]
    fixtures: Vec<PathBuf>,

    /// YAML configuration file
    #[arg(short, long, env = "GRPC_FIXTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, env = "GRPC_FIXTURE_PORT")]
    port: Option<u16>,

    /// Address to listen on
    #[arg(long, env = "GRPC_FIXTURE_HOST")]
    host: Option<IpAddr>,

    /// PEM certificate presented to intercepted TLS clients
    #[arg(long, requires = "key")]
    cert: Option<String>,

    /// PEM private key for --cert
    #[arg(long, requires = "cert")]
    key: Option<String>,

    /// Log the recorded requests of a method whenever a lookup happens
    #[arg(long)]
    dump_unary_keys: bool,

    /// Log filter, e.g. "debug" or "grpc_proxy=debug" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Command-line values take precedence over the configuration file.
    fn apply(&self, config: &mut FixtureConfig) {
        config.fixtures.paths.extend(self.fixtures.iter().cloned());
        if let Some(port) = self.port {
            config.proxy.listen.port = port;
        }
        if let Some(host) = self.host {
            config.proxy.listen.host = host;
        }
        if let (Some(cert), Some(key)) = (&self.cert, &self.key) {
            config.proxy.tls = Some(TlsConfig {
                cert_path: cert.clone(),
                key_path: key.clone(),
            });
        }
        if self.dump_unary_keys {
            config.diagnostics.dump_unary_keys = true;
        }
    }
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let mut config = match args.config {
        Some(ref path) => FixtureConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FixtureConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let store = Arc::new(load_fixture_files(&config.fixtures.paths)?);
    let interceptor = FixtureInterceptor::new(store)
        .with_key_dump(config.diagnostics.dump_unary_keys);

    let server = ProxyServer::bind(config.proxy, Arc::new(interceptor)).await?;
    info!("grpc-fixture serving on {}", server.local_addr()?);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
