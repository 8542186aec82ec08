//! 统一的 API 错误类型与转换。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    ServerMisconfigured,
    Unauthorized,
    FetchFailed,
    SaveFailed,
    MissingConfiguration,
    InvalidOperation,
    BackupNotFound,
    WebDav(StatusCode),
    Internal(String),
}

impl ApiError {
    /// 错误对应的 HTTP 状态码。
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ServerMisconfigured
            | ApiError::FetchFailed
            | ApiError::SaveFailed
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MissingConfiguration | ApiError::InvalidOperation => {
                StatusCode::BAD_REQUEST
            }
            ApiError::BackupNotFound => StatusCode::NOT_FOUND,
            ApiError::WebDav(status) => *status,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::ServerMisconfigured => f.write_str("Server misconfigured: PASSWORD not set"),
            ApiError::Unauthorized => f.write_str("Unauthorized"),
            ApiError::FetchFailed => f.write_str("Failed to fetch data"),
            ApiError::SaveFailed => f.write_str("Failed to save data"),
            ApiError::MissingConfiguration => f.write_str("Missing configuration"),
            ApiError::InvalidOperation => f.write_str("Invalid operation"),
            ApiError::BackupNotFound => f.write_str("Backup file not found"),
            ApiError::WebDav(status) => write!(f, "WebDAV Error: {}", status.as_u16()),
            ApiError::Internal(msg) => f.write_str(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        ApiError::Internal(error.to_string())
    }
}
