//! 共享密码校验：写入前的鉴权门。

use axum::http::HeaderMap;
use serde::Serialize;
use tracing::warn;

use crate::config::AUTH_PASSWORD_HEADER;
use crate::error::ApiError;

/// 服务端共享密码配置，空字符串表示未设置。
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub password: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub has_password: bool,
    pub requires_auth: bool,
}

impl AuthConfig {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn status(&self) -> AuthStatus {
        AuthStatus {
            has_password: self.has_password(),
            requires_auth: self.has_password(),
        }
    }

    /// 校验请求头中的密码；未配置密码时拒绝一切写入。
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if !self.has_password() {
            warn!("write rejected: server password not configured");
            return Err(ApiError::ServerMisconfigured);
        }

        let provided = headers
            .get(AUTH_PASSWORD_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(self.password.as_str()) {
            warn!(
                header_present = provided.is_some(),
                "write rejected: password mismatch"
            );
            return Err(ApiError::Unauthorized);
        }

        Ok(())
    }
}
