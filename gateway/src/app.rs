//! 应用状态与路由组装

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use icu_auth_core::{AuthorizationGate, RouteTable};
use icu_config::RealtimeConfig;
use icu_realtime::{HubTransport, IcuBoard, LiveStateChannel, StatusHub, Subscription, follow};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::directory::{SeedData, UserDirectory};
use crate::security_headers::security_headers_middleware;
use crate::{auth, icus, navigation, routing, ws};

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<UserDirectory>,
    pub hub: StatusHub,
    /// 状态写入的权威副本；读改写与发布在同一把锁内完成
    pub ward: Arc<Mutex<IcuBoard>>,
    /// 读取侧看板，经实时通道跟随
    pub board: Arc<RwLock<IcuBoard>>,
    pub live: Arc<LiveStateChannel>,
    pub gate: AuthorizationGate,
    pub routes: Arc<RouteTable>,
    pub metrics: Option<PrometheusHandle>,
    // 看板跟随实时通道，随状态一起释放
    _following: Arc<Subscription>,
}

impl AppState {
    pub fn new(seed: SeedData, realtime: &RealtimeConfig, metrics: Option<PrometheusHandle>) -> Self {
        let hub = StatusHub::new(realtime.hub_capacity);
        let live = Arc::new(LiveStateChannel::new(
            Arc::new(HubTransport::new(hub.clone())),
            realtime.reconnect_policy(),
        ));
        let ward = Arc::new(Mutex::new(IcuBoard::new(seed.icus.iter().cloned())));
        let board = Arc::new(RwLock::new(IcuBoard::new(seed.icus)));
        let following = follow(Arc::clone(&board), &live);

        Self {
            directory: Arc::new(UserDirectory::new(seed.users)),
            hub,
            ward,
            board,
            live,
            gate: AuthorizationGate::new(),
            routes: Arc::new(RouteTable::hospital()),
            metrics,
            _following: Arc::new(following),
        }
    }
}

/// 构建完整路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(auth::routes())
        .merge(icus::routes())
        .merge(navigation::routes())
        .merge(routing::routes())
        .route("/ws", get(ws::websocket_handler))
        .with_state(state)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
