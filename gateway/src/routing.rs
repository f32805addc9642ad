//! 运维路由

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use icu_realtime::ConnectionState;
use icu_telemetry::HealthStatus;

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let mut health = HealthStatus::new();

    let live = state.live.state();
    health.add_check(
        "live_channel",
        live == ConnectionState::Connected,
        (live != ConnectionState::Connected).then(|| live.to_string()),
    );
    health.add_check("user_directory", !state.directory.is_empty(), None);
    health.add_check("icu_board", !state.board.read().is_empty(), None);

    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
