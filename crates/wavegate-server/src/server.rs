//! Axum router: WebSocket upgrade on `/`, plus `/health` and `/metrics`.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::gateway::{Component, GatewayEvent};
use crate::health::HealthReport;
use crate::manager::ConnectionManager;
use crate::websocket::socket::run_socket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection manager of the running gateway.
    pub manager: Arc<ConnectionManager>,
    /// When the gateway started.
    pub start_time: Instant,
    /// Prometheus handle, if the host installed a recorder.
    pub metrics: Option<PrometheusHandle>,
    /// Gateway notification channel.
    pub notifications: broadcast::Sender<GatewayEvent>,
}

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / (WebSocket upgrade)
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let manager = state.manager;
    let notifications = state.notifications;
    ws.max_message_size(manager.config().max_message_size)
        .on_failed_upgrade(move |err: axum::Error| {
            warn!(error = %err, "websocket upgrade failed");
            let _ = notifications.send(GatewayEvent::Error {
                component: Component::WebSocket,
                message: err.to_string(),
            });
        })
        .on_upgrade(move |socket| run_socket(socket, manager))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::collect(&state.manager, state.start_time))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
