//! HTTP and WebSocket front end for the chatlink connection manager.
//!
//! Exposes the connection state, a network test and session regeneration
//! over HTTP, and pushes every state change to WebSocket clients.

pub mod config;
mod routes;
mod ws;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use chatlink_connection::{
    AuthStore, BridgeConnector, ConnectionManager, SessionRegenerator, origin,
};
use chatlink_diagnostics::DiagnosticsProbe;

use config::ServerConfig;

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub regenerator: Arc<SessionRegenerator>,
    pub probe: Arc<DiagnosticsProbe>,
}

impl AppState {
    pub fn new(manager: Arc<ConnectionManager>, probe: DiagnosticsProbe) -> Self {
        Self {
            regenerator: Arc::new(SessionRegenerator::new(Arc::clone(&manager))),
            manager,
            probe: Arc::new(probe),
        }
    }
}

/// Builds the router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(routes::health))
        .route("/api/state", get(routes::state))
        .route("/api/nettest", get(routes::nettest))
        .route("/api/regenerate-session", post(routes::regenerate_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `state` on `listener` until `shutdown` resolves, then ends the
/// active link.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let manager = Arc::clone(&state.manager);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    manager.shutdown().await;
    Ok(())
}

/// Runs the server described by `config` until Ctrl-C or SIGTERM.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let connector = Arc::new(BridgeConnector::new(&config.bridge_url));
    let manager = ConnectionManager::new(
        connector,
        AuthStore::new(&config.session_dir),
        config.reconnect_policy(),
    );
    let probe =
        DiagnosticsProbe::new(config.probe_config()).context("failed to build network test client")?;

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!(
        port = listener.local_addr()?.port(),
        session_dir = %config.session_dir.display(),
        bridge_url = %config.bridge_url,
        "chatlink server listening"
    );

    let initial = Arc::clone(&manager);
    tokio::spawn(async move {
        initial.start_or_retry(origin::INITIAL).await;
    });

    serve(listener, AppState::new(manager, probe), shutdown_signal()).await?;
    info!("chatlink server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
