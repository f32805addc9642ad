//! 认证路由

use axum::extract::{Json, State};
use axum::routing::post;
use axum::Router;
use icu_common::Role;
use icu_errors::AppError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::MessageError;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, MessageError> {
    let Some(account) = state.directory.verify(&req.email, &req.password) else {
        warn!(email = %req.email, "Login rejected");
        return Err(AppError::authentication_failed(INVALID_CREDENTIALS).into());
    };

    info!(user_id = %account.id, role = %account.role, "Login succeeded");
    Ok(Json(LoginResponse {
        token: account.token(),
        role: account.role,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub token: String,
    pub role: Role,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, MessageError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::validation("Missing credentials").into());
    }

    let account = state
        .directory
        .register(req.name.trim(), req.email.trim(), &req.password)?;

    Ok(Json(RegisterResponse {
        message: "User registered successfully!".to_string(),
        token: account.token(),
        role: account.role,
    }))
}
