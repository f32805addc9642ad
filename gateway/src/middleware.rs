//! 请求会话提取与授权

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use icu_auth_core::{Decision, RouteRule, Session};
use icu_errors::AppError;

use crate::app::AppState;
use crate::error::ApiError;

/// 从 `Authorization: Bearer <token>` 解析出的会话
///
/// 缺少或无法识别的 token 得到匿名会话，是否放行交给授权闸门决定。
#[derive(Debug, Clone)]
pub struct BearerSession(pub Session);

impl FromRequestParts<AppState> for BearerSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = match bearer_token(&parts.headers) {
            Some(token) => state.directory.resolve(token),
            None => Session::Anonymous,
        };
        Ok(Self(session))
    }
}

/// 取出 bearer token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// 经授权闸门检查，拒绝时转换为 401/403
pub fn require(state: &AppState, session: &Session, rule: &RouteRule) -> Result<(), ApiError> {
    match state.gate.check(session, rule) {
        Decision::Allow => Ok(()),
        Decision::DenyUnauthenticated { .. } => Err(AppError::unauthenticated("Sign in required").into()),
        Decision::DenyUnauthorized { .. } => Err(AppError::forbidden(format!(
            "Role is not allowed to access {}",
            rule.resource_path
        ))
        .into()),
    }
}
