//! 错误响应

use axum::Json;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use icu_errors::AppError;
use serde::Serialize;
use tracing::error;

/// 以 RFC 7807 Problem Details 返回的错误
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let mut response = (status, Json(self.0.to_problem_details())).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/problem+json"));
        response
    }
}

/// 认证接口沿用的 `{ "message": ... }` 错误体
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

/// 认证接口的错误
#[derive(Debug)]
pub struct MessageError(pub AppError);

impl From<AppError> for MessageError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for MessageError {
    fn into_response(self) -> Response {
        let body = MessageBody {
            message: self.0.message().to_string(),
        };
        (status_of(&self.0), Json(body)).into_response()
    }
}

fn status_of(err: &AppError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
