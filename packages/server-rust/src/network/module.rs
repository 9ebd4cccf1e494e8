//! Gateway server lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the listener, and
//! `serve()` accepts clients and runs the relay's dispatch duty until the
//! shutdown future resolves. Engines may be attached to the relay at any
//! point before or during `serve()`.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    health_handler, liveness_handler, readiness_handler, ws_upgrade_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::relay::{OutboundMessage, Relay};

/// How long shutdown waits for clients to close after the Close frame.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the listener and serves the gateway's HTTP/WebSocket surface.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    relay: Arc<Relay>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, relay: Arc<Relay>) -> Self {
        Self {
            config,
            listener: None,
            relay,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the router.
    ///
    /// - `GET /` and `GET /ws`: client WebSocket upgrade
    /// - `GET /health`: status JSON
    /// - `GET /health/live`, `GET /health/ready`: probes
    pub fn build_router(&self) -> Router {
        router(
            AppState {
                relay: Arc::clone(&self.relay),
                shutdown: Arc::clone(&self.shutdown),
                config: Arc::new(self.config.clone()),
                start_time: Instant::now(),
            },
            &self.config,
        )
    }

    /// Binds the listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();

        info!("Gateway listening on {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves clients until `shutdown` resolves, then drains.
    ///
    /// Draining marks the gateway as not accepting, stops the dispatch duty,
    /// sends every client a Close frame, and waits up to 30 seconds for the
    /// connections to end.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, if TLS material cannot
    /// be loaded, or on a fatal server I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .context("start() must be called before serve()")?;
        let router = router(
            AppState {
                relay: Arc::clone(&self.relay),
                shutdown: Arc::clone(&self.shutdown),
                config: Arc::new(self.config.clone()),
                start_time: Instant::now(),
            },
            &self.config,
        );

        let dispatch = tokio::spawn({
            let relay = Arc::clone(&self.relay);
            let shutdown_rx = self.shutdown.shutdown_receiver();
            async move { relay.run_dispatch(shutdown_rx).await }
        });

        self.shutdown.set_ready();

        // Flip to Draining as soon as the signal fires so new upgrades are
        // refused while the server winds down.
        let shutdown_ctrl = Arc::clone(&self.shutdown);
        let shutdown = async move {
            shutdown.await;
            shutdown_ctrl.trigger_shutdown();
        };

        let served = match &self.config.tls {
            Some(tls) => {
                serve_tls(listener, router, tls, &self.relay, &self.shutdown, shutdown).await
            }
            None => serve_plain(listener, router, &self.relay, &self.shutdown, shutdown).await,
        };

        self.shutdown.trigger_shutdown();
        if let Err(err) = dispatch.await {
            warn!(error = %err, "Dispatch task failed");
        }
        served
    }
}

fn router(state: AppState, config: &NetworkConfig) -> Router {
    Router::new()
        .route("/", get(ws_upgrade_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .layer(build_http_layers(config))
        .with_state(state)
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    relay: &Relay,
    shutdown_ctrl: &ShutdownController,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Serving plain WebSocket connections");

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .into_future();
    run_until_drained(server, relay, shutdown_ctrl).await
}

async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    relay: &Relay,
    shutdown_ctrl: &ShutdownController,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .context("failed to load TLS certificates")?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });

    info!("Serving TLS WebSocket connections on {}", addr);

    let server = axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>());
    run_until_drained(server, relay, shutdown_ctrl).await
}

/// Runs `server` while draining client connections once shutdown begins.
///
/// Upgraded sockets are not tracked by the HTTP server's graceful shutdown,
/// so they are closed and awaited separately.
async fn run_until_drained<E>(
    server: impl Future<Output = Result<(), E>>,
    relay: &Relay,
    shutdown_ctrl: &ShutdownController,
) -> anyhow::Result<()>
where
    E: Into<anyhow::Error>,
{
    let server = async {
        let served = server.await;
        // A failed server must still release the drain below.
        shutdown_ctrl.trigger_shutdown();
        served
    };
    let drain = async {
        let mut stop = shutdown_ctrl.shutdown_receiver();
        if stop.wait_for(|stop| *stop).await.is_ok() {
            drain_connections(relay, shutdown_ctrl).await;
        }
    };

    let (served, ()) = tokio::join!(server, drain);
    served.map_err(Into::into)
}

/// Closes every session and waits for the connections to end.
async fn drain_connections(relay: &Relay, shutdown_ctrl: &ShutdownController) {
    let sessions = relay.drain_all();
    if !sessions.is_empty() {
        info!("Draining {} client connections", sessions.len());
        for session in &sessions {
            if !session.try_send(OutboundMessage::Close(Some("gateway shutting down".to_string())))
            {
                warn!(identity = %session.identity(), "Could not queue close frame");
            }
        }
    }

    if shutdown_ctrl.wait_for_drain(DRAIN_TIMEOUT).await {
        info!("All client connections drained");
    } else {
        warn!(
            remaining = shutdown_ctrl.active_connections(),
            "Drain timeout expired with connections still open"
        );
    }
}
