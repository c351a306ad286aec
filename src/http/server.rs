//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Build the gated router around the upload delegate
//! - Own the client registry shared with the visitor sweeper
//! - Serve connections with bounded header-read time and idle reclaim
//! - Drain connections on shutdown

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request},
    http::header::{InvalidHeaderName, InvalidHeaderValue},
    response::IntoResponse,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto,
};
use tokio::net::TcpStream;
use tower::{Service, ServiceExt};

use crate::config::{GateConfig, Secret};
use crate::http::pipeline::Pipeline;
use crate::http::upstream::{UploadProxy, UpstreamError};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{ConnectionActivity, ConnectionTracker, Listener, ListenerError};
use crate::security::rate_limit::{ClientRegistry, RateLimitPolicy};
use crate::sweeper::ExpirySweeper;

/// How long shutdown waits for open connections to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid response header value: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),

    #[error("invalid header name: {0}")]
    HeaderName(#[from] InvalidHeaderName),

    #[error("failed to construct upload delegate: {0}")]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// The upload gate: pipeline, registry and transport settings.
pub struct GateServer {
    router: Router,
    config: GateConfig,
    registry: Arc<ClientRegistry>,
}

impl GateServer {
    /// Gate in front of the configured upload server.
    pub fn new(config: GateConfig, secret: Secret) -> Result<Self, ServerError> {
        let proxy = UploadProxy::new(&config.upload.upstream_url, config.timeouts.upstream())?;
        tracing::info!(upstream = %proxy.authority(), "Upload delegate configured");

        let delegate = tower::service_fn(move |request: Request| {
            let proxy = proxy.clone();
            async move { Ok::<_, Infallible>(proxy.forward(request).await) }
        });
        Self::with_delegate(config, secret, delegate)
    }

    /// Gate in front of any upload service.
    pub fn with_delegate<S>(config: GateConfig, secret: Secret, delegate: S) -> Result<Self, ServerError>
    where
        S: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse + 'static,
        S::Future: Send + 'static,
    {
        let registry = Arc::new(ClientRegistry::new(RateLimitPolicy::from_config(&config.rate_limit)));
        let router = Pipeline::new(&config, secret, Arc::clone(&registry))?.into_router(delegate);

        Ok(Self {
            router,
            config,
            registry,
        })
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// The gated router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Expiry schedules bound to this server's registry and storage.
    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(self.registry(), &self.config.sweeper, &self.config.upload)
    }

    /// Accept and serve connections until `shutdown` fires, then wait (up to
    /// a deadline) for open connections to drain.
    pub async fn run(self, listener: Listener, mut shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_connections = listener.max_connections(),
            "HTTP server starting"
        );

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.timeouts.header_read());

        let idle = self.config.timeouts.idle();
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };

                    let router = self.router.clone();
                    let builder = builder.clone();
                    let guard = tracker.track();
                    let shutdown = shutdown.clone();

                    tokio::spawn(async move {
                        tracing::trace!(connection_id = %guard.id(), peer = %peer, "Serving connection");
                        serve_connection(builder, stream, peer, router, idle, shutdown).await;
                        drop(permit);
                        drop(guard);
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!(
                        open_connections = listener.max_connections() - listener.available_permits(),
                        "Shutdown signal received, no longer accepting connections"
                    );
                    break;
                }
            }
        }

        drop(listener);
        if tokio::time::timeout(DRAIN_TIMEOUT, tracker.wait_for_drain()).await.is_err() {
            tracing::warn!(
                remaining = tracker.active_count(),
                "Connections still open after drain timeout"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Serve one connection until the client closes it, it sits idle for
/// `idle`, or shutdown fires. The last two close it gracefully: an in-flight
/// response is completed first.
async fn serve_connection(
    builder: auto::Builder<TokioExecutor>,
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    idle: Duration,
    mut shutdown: ShutdownSignal,
) {
    let activity = ConnectionActivity::new();

    let service = {
        let activity = Arc::clone(&activity);
        hyper::service::service_fn(move |mut request: hyper::Request<Incoming>| {
            let guard = activity.begin();
            request.extensions_mut().insert(ConnectInfo(peer));
            let router = router.clone();
            async move {
                let response = router.oneshot(request).await;
                drop(guard);
                response
            }
        })
    };

    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);
    let mut closing = false;

    loop {
        let wake_at = activity
            .idle_deadline(idle)
            .unwrap_or_else(|| tokio::time::Instant::now() + idle);

        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(peer = %peer, error = %e, "Connection ended with error");
                }
                break;
            }
            _ = tokio::time::sleep_until(wake_at), if !closing => {
                if activity.is_idle_for(idle) {
                    tracing::debug!(peer = %peer, "Closing idle connection");
                    closing = true;
                    connection.as_mut().graceful_shutdown();
                }
            }
            _ = shutdown.recv(), if !closing => {
                closing = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Convenience for binaries and tests: serve on `listener` until `shutdown`
/// is triggered, with both sweepers running alongside.
pub async fn serve_with_sweepers(
    server: GateServer,
    listener: Listener,
    shutdown: &Shutdown,
) -> Result<(), ServerError> {
    let sweepers = server.sweeper().spawn(shutdown);
    let result = server.run(listener, shutdown.subscribe()).await;
    // The server only returns early on error; make sure the sweepers stop too.
    shutdown.trigger();
    sweepers.join().await;
    result
}
