//! ICU Reserve API Gateway

mod app;
mod auth;
mod directory;
mod error;
mod icus;
mod middleware;
mod navigation;
mod routing;
mod security_headers;
mod ws;

use std::net::SocketAddr;

use icu_config::AppConfig;
use icu_telemetry::{init_from_config, init_metrics};
use tracing::{info, warn};

use crate::app::AppState;
use crate::directory::SeedData;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // 加载配置
    let config = AppConfig::load("config")?;

    // 初始化 tracing 与 metrics
    init_from_config(&config.telemetry);
    let metrics = init_metrics()?;

    let seed = SeedData::load(config.directory.seed_file.as_deref())?;
    let state = AppState::new(seed, &config.realtime, Some(metrics));
    state.live.connect();

    let app = app::router(state.clone());

    // 启动服务器
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, env = %config.app_env, "Starting gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.live.disconnect().await;
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
