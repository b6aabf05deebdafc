//! ProxyServer struct and main run loop.
//!
//! Accepted sockets and connections taken over by the CONNECT handler meet
//! in one inbound queue. The serve loop drains it, classifies each
//! connection, terminates TLS where needed and serves HTTP/1.1 and HTTP/2 on
//! the result.

use super::client::create_http_client;
use super::network::create_reusable_listener;
use super::router::{ConnectionInfo, Router};
use super::tls::{PemTlsTerminator, TlsTerminator};
use crate::config::Config;
use crate::error::ProxyError;
use crate::grpc::{GrpcService, Interceptor};
use crate::listener::{
    classify, inbound_queue, Classification, Inbound, InboundQueue, InboundReceiver, MarkedConn,
};
use crate::marker::Markable;
use crate::metrics::{self, MetricsServer};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const INBOUND_QUEUE_CAPACITY: usize = 1024;

/// The main proxy server struct.
pub struct ProxyServer {
    config: Arc<Config>,
    listener: TcpListener,
    router: Arc<Router>,
    terminator: Option<Arc<dyn TlsTerminator>>,
    queue: InboundQueue,
    receiver: InboundReceiver,
}

/// Shared state of every connection task.
struct ConnectionContext {
    router: Arc<Router>,
    terminator: Option<Arc<dyn TlsTerminator>>,
    classify_timeout: Duration,
}

impl ProxyServer {
    /// Bind the listener and build everything the serve loop needs.
    ///
    /// `interceptor` serves every gRPC call the proxy receives.
    pub async fn bind(
        config: Config,
        interceptor: Arc<dyn Interceptor>,
    ) -> Result<Self, anyhow::Error> {
        config.validate()?;

        let addr = config.listen.socket_addr();
        let listener = create_reusable_listener(addr).map_err(|e| ProxyError::Bind(addr, e))?;

        let terminator: Option<Arc<dyn TlsTerminator>> = match config.tls {
            Some(ref tls) => Some(Arc::new(PemTlsTerminator::from_pem_files(
                &tls.cert_path,
                &tls.key_path,
            )?)),
            None => None,
        };

        let http_client = create_http_client(&config)?;
        let (queue, receiver) = inbound_queue(INBOUND_QUEUE_CAPACITY);
        let grpc = GrpcService::new(interceptor, config.grpc.clone());
        let router = Arc::new(Router::new(grpc, http_client, queue.clone()));

        Ok(Self {
            config: Arc::new(config),
            listener,
            router,
            terminator,
            queue,
            receiver,
        })
    }

    /// Replace the TLS terminator built from the configuration.
    pub fn with_tls_terminator(mut self, terminator: Arc<dyn TlsTerminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Producer handle on the inbound queue, for feeding in connections
    /// from outside the listener.
    pub fn inbound_queue(&self) -> InboundQueue {
        self.queue.clone()
    }

    /// Run the proxy server until the process exits.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        self.run_until(std::future::pending()).await
    }

    /// Run the proxy server until `shutdown` resolves. Connections already
    /// being served are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        let ProxyServer {
            config,
            listener,
            router,
            terminator,
            queue,
            mut receiver,
        } = self;

        let addr = listener.local_addr()?;
        info!("Listening on {} (HTTP/1.1, h2c, TLS, CONNECT)", addr);
        match terminator {
            Some(_) => info!("TLS interception enabled"),
            None => warn!("No TLS certificate configured, TLS connections will be dropped"),
        }

        if config.metrics.enabled {
            let metrics_addr = SocketAddr::new(config.listen.host, config.metrics.port);
            tokio::spawn(async move {
                if let Err(e) = MetricsServer::new(metrics_addr).run().await {
                    error!("Metrics server failed: {}", e);
                }
            });
        }

        let acceptor = tokio::spawn(accept_loop(listener, queue));
        let ctx = Arc::new(ConnectionContext {
            router,
            terminator,
            classify_timeout: config.listen.classify_timeout(),
        });

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                inbound = receiver.recv() => {
                    let Some(inbound) = inbound else { break };
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(serve_inbound(ctx, inbound));
                }
                _ = &mut shutdown => {
                    info!("Shutting down listener on {}", addr);
                    break;
                }
            }
        }

        acceptor.abort();
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, queue: InboundQueue) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                }
                if queue.accepted(MarkedConn::new(stream), peer).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

/// Classify one inbound connection, terminate TLS if needed, then serve it.
async fn serve_inbound(ctx: Arc<ConnectionContext>, inbound: Inbound) {
    let Inbound {
        conn,
        peer,
        target_host,
    } = inbound;
    let redirected = target_host.is_some();
    let label = target_host
        .clone()
        .or_else(|| peer.map(|p| p.to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    let (classification, io) = match tokio::time::timeout(ctx.classify_timeout, classify(conn)).await
    {
        Ok(Ok(classified)) => classified,
        Ok(Err(e)) => {
            debug!("Dropping connection {}: {}", label, e);
            metrics::record_connection("failed", redirected);
            return;
        }
        Err(_) => {
            debug!("Dropping connection {}: classification timed out", label);
            metrics::record_connection("failed", redirected);
            return;
        }
    };
    metrics::record_connection(classification.as_str(), redirected);

    let conn = match classification {
        Classification::Plaintext => MarkedConn::new(io),
        Classification::Tls => {
            let Some(ref terminator) = ctx.terminator else {
                warn!("Dropping TLS connection {}: no certificate configured", label);
                return;
            };
            match terminator.terminate(Box::new(io), target_host.as_deref()).await {
                Ok(plain) => {
                    let mut conn = MarkedConn::new(plain);
                    conn.mark_secure();
                    conn
                }
                Err(e) => {
                    debug!("TLS handshake failed for {}: {}", label, e);
                    return;
                }
            }
        }
    };

    serve_connection(Arc::clone(&ctx.router), conn, peer, &label).await;
}

async fn serve_connection(
    router: Arc<Router>,
    conn: MarkedConn,
    peer: Option<SocketAddr>,
    label: &str,
) {
    let info = ConnectionInfo {
        secure: conn.is_secure(),
        peer,
    };
    let io = TokioIo::new(conn);
    let service = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { router.handle(req, info).await }
    });

    if let Err(err) = auto::Builder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(io, service)
        .await
    {
        debug!("Error serving connection {}: {}", label, err);
    }
}
