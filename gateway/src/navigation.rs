//! 导航求值
//!
//! 告诉前端外壳：以当前 bearer 会话访问某个页面时，是渲染还是跳转

use axum::extract::{Json, Query, State};
use axum::routing::get;
use axum::Router;
use icu_auth_core::Navigation;
use serde::Deserialize;

use crate::app::AppState;
use crate::middleware::BearerSession;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/navigation", get(navigate))
}

#[derive(Debug, Deserialize)]
pub struct NavigationQuery {
    pub path: String,
}

async fn navigate(
    State(state): State<AppState>,
    BearerSession(session): BearerSession,
    Query(query): Query<NavigationQuery>,
) -> Json<Navigation> {
    Json(state.routes.navigate(&state.gate, &session, &query.path))
}
