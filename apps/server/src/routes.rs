//! HTTP handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use chatlink_diagnostics::NetReport;
use chatlink_protocol::ConnectionState;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StateResponse {
    #[serde(flatten)]
    state: ConnectionState,
    session_dir: String,
}

/// GET /health
pub(crate) async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /api/state
pub(crate) async fn state(State(app): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        state: app.manager.snapshot(),
        session_dir: app.manager.auth().dir().display().to_string(),
    })
}

/// GET /api/nettest
pub(crate) async fn nettest(State(app): State<AppState>) -> Json<NetReport> {
    Json(app.probe.run().await)
}

/// POST /api/regenerate-session
pub(crate) async fn regenerate_session(State(app): State<AppState>) -> Response {
    match app.regenerator.regenerate().await {
        Ok(()) => {
            info!("session regenerated");
            Json(json!({
                "ok": true,
                "message": "session regenerated, waiting for a new QR code",
            }))
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "session regeneration failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
