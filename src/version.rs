//! 构建信息接口。

use axum::response::Json as JsonResponse;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    name: &'static str,
    version: &'static str,
    commit: &'static str,
    build_time: &'static str,
    build_env: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            name: crate::build::PROJECT_NAME,
            version: crate::build::PKG_VERSION,
            commit: crate::build::SHORT_COMMIT,
            build_time: crate::build::BUILD_TIME,
            build_env: format!(
                "{},{}",
                crate::build::RUST_VERSION,
                crate::build::RUST_CHANNEL
            ),
        }
    }
}

/// 返回当前构建信息。
pub async fn get_build_info() -> JsonResponse<BuildInfo> {
    JsonResponse(BuildInfo::current())
}
