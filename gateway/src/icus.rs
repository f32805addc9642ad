//! ICU 路由
//!
//! 写操作在网关的权威副本上串行完成并发布到广播中心；列表读取的看板经实时通道跟随

use axum::extract::{Json, Path, State};
use axum::routing::{get, post, put};
use axum::Router;
use icu_auth_core::RouteRule;
use icu_common::{IcuStatus, Role};
use icu_errors::{AppError, AppResult};
use icu_realtime::{EntityStatusEvent, IcuRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{BearerSession, require};

/// 允许修改 ICU 状态的规则
pub fn ward_rule() -> RouteRule {
    RouteRule::new("/api/icus/status", [Role::Manager, Role::Admin])
}

/// 允许预约 ICU 的规则
pub fn reservation_rule() -> RouteRule {
    RouteRule::new("/api/icus/reserve", [Role::Patient])
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/icus", get(list_icus))
        .route("/api/icus/{id}", get(get_icu))
        .route("/api/icus/{id}/status", put(update_status))
        .route("/api/icus/{id}/status/cycle", post(cycle_status))
        .route("/api/icus/{id}/reserve", post(reserve_icu))
}

async fn list_icus(State(state): State<AppState>) -> Json<Vec<IcuRecord>> {
    Json(state.board.read().list())
}

async fn get_icu(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<IcuRecord>, ApiError> {
    state
        .board
        .read()
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("ICU {} not found", id)).into())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub new_status: IcuStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub icu_id: String,
    pub previous_status: IcuStatus,
    pub new_status: IcuStatus,
    /// 收到该事件的在线接收端数量
    pub receivers: usize,
}

async fn update_status(
    State(state): State<AppState>,
    BearerSession(session): BearerSession,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<StatusChange>, ApiError> {
    require(&state, &session, &ward_rule())?;
    transition(&state, id, |_| Ok(update.new_status)).map(Json)
}

async fn cycle_status(
    State(state): State<AppState>,
    BearerSession(session): BearerSession,
    Path(id): Path<String>,
) -> Result<Json<StatusChange>, ApiError> {
    require(&state, &session, &ward_rule())?;
    transition(&state, id, |current| Ok(current.next())).map(Json)
}

async fn reserve_icu(
    State(state): State<AppState>,
    BearerSession(session): BearerSession,
    Path(id): Path<String>,
) -> Result<Json<StatusChange>, ApiError> {
    require(&state, &session, &reservation_rule())?;
    let change = transition(&state, id, |current| match current {
        IcuStatus::Available => Ok(IcuStatus::Occupied),
        other => Err(AppError::conflict(format!("ICU is {} and cannot be reserved", other))),
    })?;

    info!(icu_id = %change.icu_id, "ICU reserved");
    Ok(Json(change))
}

/// 在权威副本上完成一次状态迁移并发布
///
/// 读取、写入和发布持有同一把锁，广播顺序因此与写入顺序一致。
fn transition(
    state: &AppState,
    icu_id: String,
    next: impl FnOnce(IcuStatus) -> AppResult<IcuStatus>,
) -> Result<StatusChange, ApiError> {
    let mut ward = state.ward.lock();
    let previous = ward
        .get(&icu_id)
        .map(|record| record.status)
        .ok_or_else(|| AppError::not_found(format!("ICU {} not found", icu_id)))?;
    let new_status = next(previous)?;

    let event = EntityStatusEvent::icu(icu_id.clone(), new_status);
    ward.apply(&event);
    let receivers = state.hub.publish(&event);
    drop(ward);

    info!(icu_id = %icu_id, from = %previous, to = %new_status, receivers, "ICU status changed");
    Ok(StatusChange {
        icu_id,
        previous_status: previous,
        new_status,
        receivers,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::app::router;
    use crate::app::testing::{body_json, connected_state, json_request};

    async fn wait_for_status(state: &AppState, id: &str, wanted: IcuStatus) {
        for _ in 0..200 {
            if state.board.read().get(id).map(|r| r.status) == Some(wanted) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{id} never became {wanted}");
    }

    #[tokio::test]
    async fn test_list_is_public() {
        let app = router(connected_state().await);
        let response = app.oneshot(json_request("GET", "/api/icus", None, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[1]["id"], "icu02");
        assert_eq!(body[1]["status"], "OCCUPIED");
    }

    #[tokio::test]
    async fn test_manager_update_reaches_board() {
        let state = connected_state().await;
        let response = router(state.clone())
            .oneshot(json_request(
                "PUT",
                "/api/icus/icu01/status",
                Some("mock-jwt-token-2"),
                Some(json!({"newStatus": "OCCUPIED"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["previousStatus"], "AVAILABLE");
        assert_eq!(body["newStatus"], "OCCUPIED");
        assert_eq!(body["receivers"], 1);

        wait_for_status(&state, "icu01", IcuStatus::Occupied).await;
    }

    #[tokio::test]
    async fn test_cycle_advances_status() {
        let state = connected_state().await;
        let response = router(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/icus/icu03/status/cycle",
                Some("mock-jwt-token-1"),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["newStatus"], "AVAILABLE");
        wait_for_status(&state, "icu03", IcuStatus::Available).await;
    }

    #[tokio::test]
    async fn test_status_change_requires_ward_role() {
        let state = connected_state().await;

        let anonymous = router(state.clone())
            .oneshot(json_request(
                "PUT",
                "/api/icus/icu01/status",
                None,
                Some(json!({"newStatus": "MAINTENANCE"})),
            ))
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            anonymous.headers().get("content-type").unwrap(),
            "application/problem+json"
        );

        let nurse = router(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/icus/icu01/status/cycle",
                Some("mock-jwt-token-4"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(nurse.status(), StatusCode::FORBIDDEN);

        assert_eq!(state.board.read().get("icu01").unwrap().status, IcuStatus::Available);
    }

    #[tokio::test]
    async fn test_cycle_right_after_update_starts_from_new_status() {
        let state = connected_state().await;
        let updated = router(state.clone())
            .oneshot(json_request(
                "PUT",
                "/api/icus/icu01/status",
                Some("mock-jwt-token-2"),
                Some(json!({"newStatus": "OCCUPIED"})),
            ))
            .await
            .unwrap();
        assert_eq!(updated.status(), StatusCode::OK);

        let cycled = router(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/icus/icu01/status/cycle",
                Some("mock-jwt-token-2"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(cycled.status(), StatusCode::OK);
        let body = body_json(cycled).await;
        assert_eq!(body["previousStatus"], "OCCUPIED");
        assert_eq!(body["newStatus"], "MAINTENANCE");

        wait_for_status(&state, "icu01", IcuStatus::Maintenance).await;
    }

    #[tokio::test]
    async fn test_writes_are_published_in_order() {
        let state = connected_state().await;
        let mut rx = state.hub.subscribe();

        for _ in 0..3 {
            let response = router(state.clone())
                .oneshot(json_request(
                    "POST",
                    "/api/icus/icu03/status/cycle",
                    Some("mock-jwt-token-1"),
                    None,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv().await.unwrap().decode_status().unwrap().new_status);
        }
        assert_eq!(
            seen,
            [IcuStatus::Available, IcuStatus::Occupied, IcuStatus::Maintenance]
        );
    }

    #[tokio::test]
    async fn test_patient_reserves_available_icu() {
        let state = connected_state().await;
        let response = router(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/icus/icu01/reserve",
                Some("mock-jwt-token-8"),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["icuId"], "icu01");
        assert_eq!(body["previousStatus"], "AVAILABLE");
        assert_eq!(body["newStatus"], "OCCUPIED");
        wait_for_status(&state, "icu01", IcuStatus::Occupied).await;

        let again = router(state)
            .oneshot(json_request(
                "POST",
                "/api/icus/icu01/reserve",
                Some("mock-jwt-token-8"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_reservation_is_for_patients_only() {
        let state = connected_state().await;

        let anonymous = router(state.clone())
            .oneshot(json_request("POST", "/api/icus/icu01/reserve", None, None))
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        for staff in ["mock-jwt-token-1", "mock-jwt-token-4", "mock-jwt-token-7"] {
            let response = router(state.clone())
                .oneshot(json_request("POST", "/api/icus/icu01/reserve", Some(staff), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{staff}");
        }

        assert_eq!(state.ward.lock().get("icu01").unwrap().status, IcuStatus::Available);
    }

    #[tokio::test]
    async fn test_occupied_or_maintenance_icu_cannot_be_reserved() {
        let state = connected_state().await;
        let mut rx = state.hub.subscribe();

        for id in ["icu02", "icu03"] {
            let response = router(state.clone())
                .oneshot(json_request(
                    "POST",
                    &format!("/api/icus/{id}/reserve"),
                    Some("mock-jwt-token-8"),
                    None,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CONFLICT, "{id}");
            assert_eq!(
                response.headers().get("content-type").unwrap(),
                "application/problem+json"
            );
        }

        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_unknown_icu_is_not_found() {
        let state = connected_state().await;
        let response = router(state)
            .oneshot(json_request(
                "POST",
                "/api/icus/icu99/status/cycle",
                Some("mock-jwt-token-1"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
