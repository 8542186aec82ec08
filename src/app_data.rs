//! 导航数据存储接口：读取、鉴权检查与整体覆盖写入。

use axum::body::Bytes;
use axum::extract::{Extension, Query};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::AuthConfig;
use crate::config::APP_DATA_KEY;
use crate::error::ApiError;
use crate::storage::KvStore;

const CHECK_AUTH_PARAM: &str = "checkAuth";

#[derive(Serialize)]
pub struct SaveResponse {
    success: bool,
}

/// 读取数据；`checkAuth=true` 时只返回密码配置状态。
pub async fn get_app_data(
    Query(params): Query<Vec<(String, String)>>,
    Extension(auth): Extension<Arc<AuthConfig>>,
    Extension(store): Extension<Arc<KvStore>>,
) -> Result<Response, ApiError> {
    if first_param(&params, CHECK_AUTH_PARAM) == Some("true") {
        return Ok(JsonResponse(auth.status()).into_response());
    }

    let stored = store.get(APP_DATA_KEY).await.map_err(|err| {
        warn!(error = %err, "fetch app data failed");
        ApiError::FetchFailed
    })?;

    let Some(bytes) = stored else {
        info!("no app data stored yet, returning empty document");
        return Ok(JsonResponse(json!({ "links": [], "categories": [] })).into_response());
    };

    info!(size = bytes.len(), "fetch app data");
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        bytes,
    )
        .into_response())
}

/// 保存数据：校验密码后整体覆盖；`authOnly` 为真时只校验不写入。
pub async fn save_app_data(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthConfig>>,
    Extension(store): Extension<Arc<KvStore>>,
    body: Bytes,
) -> Result<JsonResponse<SaveResponse>, ApiError> {
    auth.authorize(&headers)?;

    let document: Value = serde_json::from_slice(&body).map_err(|err| {
        warn!(error = %err, "save app data rejected: body is not json");
        ApiError::SaveFailed
    })?;

    if document.get("authOnly").is_some_and(is_truthy) {
        info!("password verified, auth only");
        return Ok(JsonResponse(SaveResponse { success: true }));
    }

    let bytes = serde_json::to_vec(&document).map_err(|err| {
        warn!(error = %err, "serialize app data failed");
        ApiError::SaveFailed
    })?;
    store.put(APP_DATA_KEY, &bytes).await.map_err(|err| {
        warn!(error = %err, "save app data failed");
        ApiError::SaveFailed
    })?;

    info!(size = bytes.len(), "save app data");
    Ok(JsonResponse(SaveResponse { success: true }))
}

/// 同名参数重复时取第一个。
fn first_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// 按 JavaScript 的真值规则判断 JSON 值。
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
