//! WebDAV 备份代理：把前端的 check/upload/download 翻译成 WebDAV 请求。

use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use axum_extra::headers::{Authorization, HeaderMapExt, UserAgent};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{BACKUP_FILE_NAME, WEBDAV_USER_AGENT};
use crate::error::ApiError;

/// 代理共享的出站 HTTP 客户端。
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    client: Client,
}

impl BridgeConfig {
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Check,
    Upload,
    Download,
}

impl Operation {
    fn parse(value: Option<&str>) -> Result<Self, ApiError> {
        match value {
            Some("check") => Ok(Operation::Check),
            Some("upload") => Ok(Operation::Upload),
            Some("download") => Ok(Operation::Download),
            _ => Err(ApiError::InvalidOperation),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Operation::Check => "check",
            Operation::Upload => "upload",
            Operation::Download => "download",
        }
    }
}

/// 请求体的三个字段；字段类型不符时按缺失处理，不作为解析错误。
struct BridgeRequest {
    operation: Option<String>,
    config: Option<Value>,
    payload: Option<Value>,
}

impl BridgeRequest {
    /// 只有请求体不是 JSON 时才失败。
    fn parse(body: &[u8]) -> Result<Self, ApiError> {
        let mut value: Value = serde_json::from_slice(body)?;
        let mut take = |key: &str| value.as_object_mut().and_then(|map| map.remove(key));
        Ok(Self {
            operation: take("operation").and_then(|op| op.as_str().map(str::to_string)),
            config: take("config"),
            payload: take("payload"),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct OperationResult {
    success: bool,
    status: u16,
}

impl OperationResult {
    fn from_status(status: StatusCode) -> Self {
        Self {
            success: status.is_success() || status == StatusCode::MULTI_STATUS,
            status: status.as_u16(),
        }
    }
}

/// 已校验的远端目标：目录 URL、备份文件 URL 与认证信息。
struct RemoteTarget {
    base_url: String,
    file_url: String,
    headers: HeaderMap,
}

impl RemoteTarget {
    /// 从 `config` 构建目标；非对象或字段缺失、为空、非字符串都视为缺少配置。
    fn from_config(config: Option<&Value>) -> Result<Self, ApiError> {
        let field = |key: &str| {
            config
                .and_then(|config| config.get(key))
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
        };
        let (Some(url), Some(username), Some(password)) =
            (field("url"), field("username"), field("password"))
        else {
            return Err(ApiError::MissingConfiguration);
        };

        let base_url = normalize_base_url(url);
        let file_url = format!("{base_url}{BACKUP_FILE_NAME}");

        let mut headers = HeaderMap::new();
        headers.typed_insert(Authorization::basic(username, password));
        headers.typed_insert(UserAgent::from_static(WEBDAV_USER_AGENT));

        Ok(Self {
            base_url,
            file_url,
            headers,
        })
    }
}

/// 去除首尾空白并确保以 `/` 结尾。
fn normalize_base_url(url: &str) -> String {
    let mut base_url = url.trim().to_string();
    if !base_url.ends_with('/') {
        base_url.push('/');
    }
    base_url
}

fn propfind_method() -> Result<Method, ApiError> {
    Method::from_bytes(b"PROPFIND").map_err(|err| ApiError::Internal(err.to_string()))
}

/// 处理 `/api/webdav` 代理请求。
pub async fn webdav_proxy(
    Extension(bridge): Extension<Arc<BridgeConfig>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = BridgeRequest::parse(&body)?;
    let operation = Operation::parse(request.operation.as_deref())?;
    let target = RemoteTarget::from_config(request.config.as_ref())?;

    info!(
        operation = operation.as_str(),
        base_url = %target.base_url,
        "webdav proxy request"
    );

    let result = match operation {
        Operation::Check => check(&bridge.client, &target).await,
        Operation::Upload => upload(&bridge.client, &target, request.payload.as_ref()).await,
        Operation::Download => download(&bridge.client, &target).await,
    };
    if let Err(err) = &result {
        warn!(operation = operation.as_str(), error = %err, "webdav proxy failed");
    }
    result
}

async fn check(client: &Client, target: &RemoteTarget) -> Result<Response, ApiError> {
    let response = client
        .request(propfind_method()?, &target.base_url)
        .headers(target.headers.clone())
        .header("Depth", "0")
        .send()
        .await?;
    Ok(JsonResponse(OperationResult::from_status(response.status())).into_response())
}

async fn upload(
    client: &Client,
    target: &RemoteTarget,
    payload: Option<&Value>,
) -> Result<Response, ApiError> {
    let mut request = client
        .put(&target.file_url)
        .headers(target.headers.clone())
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(payload) = payload {
        request = request.body(serde_json::to_vec(payload)?);
    }
    let response = request.send().await?;
    Ok(JsonResponse(OperationResult::from_status(response.status())).into_response())
}

async fn download(client: &Client, target: &RemoteTarget) -> Result<Response, ApiError> {
    let response = client
        .get(&target.file_url)
        .headers(target.headers.clone())
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::BackupNotFound);
    }
    if !status.is_success() {
        return Err(ApiError::WebDav(status));
    }

    let data: Value = response.json().await?;
    Ok(JsonResponse(data).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body as AxumBody;
    use axum::http::{Request, Uri};
    use dav_server::{DavHandler, fakels::FakeLs, memfs::MemFs};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: Method,
        path: String,
        headers: HeaderMap,
        body: Bytes,
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve remote");
        });
        format!("http://{addr}")
    }

    /// 固定返回指定状态码并记录请求的远端。
    async fn recording_remote(status: StatusCode) -> (String, Arc<Mutex<Vec<Recorded>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_handler = log.clone();
        let router = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                let log = log_for_handler.clone();
                async move {
                    log.lock().await.push(Recorded {
                        method,
                        path: uri.path().to_string(),
                        headers,
                        body,
                    });
                    status
                }
            },
        );
        (serve(router).await, log)
    }

    async fn dav_remote() -> String {
        let dav = DavHandler::builder()
            .filesystem(MemFs::new())
            .locksystem(FakeLs::new())
            .build_handler();
        let router = Router::new().fallback(move |req: Request<AxumBody>| {
            let dav = dav.clone();
            async move { dav.handle(req).await }
        });
        serve(router).await
    }

    fn make_bridge() -> Arc<BridgeConfig> {
        Arc::new(BridgeConfig::new(Some(Duration::from_secs(10))).expect("http client"))
    }

    fn request_body(operation: &str, url: &str, payload: Option<Value>) -> Bytes {
        let mut body = json!({
            "operation": operation,
            "config": { "url": url, "username": "cloud", "password": "nav" },
        });
        if let Some(payload) = payload {
            body["payload"] = payload;
        }
        Bytes::from(body.to_string())
    }

    async fn call(body: Bytes) -> Result<Value, ApiError> {
        let response = webdav_proxy(Extension(make_bridge()), body).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        Ok(serde_json::from_slice(&bytes).expect("json"))
    }

    #[test]
    fn base_url_is_trimmed_and_slash_terminated() {
        assert_eq!(normalize_base_url(" https://dav.example/x "), "https://dav.example/x/");
        assert_eq!(normalize_base_url("https://dav.example/x/"), "https://dav.example/x/");
    }

    #[test]
    fn success_covers_2xx_and_multi_status() {
        for status in [200, 201, 204, 207] {
            let result = OperationResult::from_status(StatusCode::from_u16(status).expect("status"));
            assert!(result.success, "{status} should succeed");
        }
        for status in [301, 401, 404, 500] {
            let result = OperationResult::from_status(StatusCode::from_u16(status).expect("status"));
            assert!(!result.success, "{status} should fail");
            assert_eq!(result.status, status);
        }
    }

    #[tokio::test]
    async fn check_sends_propfind_with_depth_zero() {
        let (url, log) = recording_remote(StatusCode::MULTI_STATUS).await;
        let value = call(request_body("check", &format!("{url}/dav"), None))
            .await
            .unwrap_or_else(|err| panic!("check failed: {err}"));
        assert_eq!(value, json!({ "success": true, "status": 207 }));

        let log = log.lock().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].method.as_str(), "PROPFIND");
        assert_eq!(log[0].path, "/dav/");
        assert_eq!(log[0].headers["depth"], "0");
        assert!(log[0].body.is_empty());
    }

    #[tokio::test]
    async fn check_against_missing_collection_reports_failure() {
        let (url, _log) = recording_remote(StatusCode::NOT_FOUND).await;
        let value = call(request_body("check", &url, None))
            .await
            .unwrap_or_else(|err| panic!("check failed: {err}"));
        assert_eq!(value, json!({ "success": false, "status": 404 }));
    }

    #[tokio::test]
    async fn upload_puts_payload_with_basic_auth() {
        let (url, log) = recording_remote(StatusCode::CREATED).await;
        let payload = json!({ "links": [{ "id": "1" }], "categories": [] });
        let value = call(request_body("upload", &format!("{url}/backups"), Some(payload.clone())))
            .await
            .unwrap_or_else(|err| panic!("upload failed: {err}"));
        assert_eq!(value, json!({ "success": true, "status": 201 }));

        let log = log.lock().await;
        let recorded = &log[0];
        assert_eq!(recorded.method, Method::PUT);
        assert_eq!(recorded.path, "/backups/cloudnav_backup.json");
        assert_eq!(recorded.headers[header::AUTHORIZATION], "Basic Y2xvdWQ6bmF2");
        assert_eq!(recorded.headers[header::USER_AGENT], "CloudNav/1.0");
        assert_eq!(recorded.headers[header::CONTENT_TYPE], "application/json");
        let sent: Value = serde_json::from_slice(&recorded.body).expect("json body");
        assert_eq!(sent, payload);
    }

    #[tokio::test]
    async fn download_missing_backup_is_not_found() {
        let (url, _log) = recording_remote(StatusCode::NOT_FOUND).await;
        let result = call(request_body("download", &url, None)).await;
        let err = result.err().expect("must fail");
        assert!(matches!(err, ApiError::BackupNotFound));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_relays_remote_error_status() {
        let (url, _log) = recording_remote(StatusCode::UNAUTHORIZED).await;
        let result = call(request_body("download", &url, None)).await;
        let err = result.err().expect("must fail");
        assert!(matches!(err, ApiError::WebDav(status) if status == StatusCode::UNAUTHORIZED));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn download_returns_remote_document_unwrapped() {
        let router = Router::new().fallback(|| async { r#"{"links":[],"categories":[]}"# });
        let url = serve(router).await;
        let value = call(request_body("download", &url, None))
            .await
            .unwrap_or_else(|err| panic!("download failed: {err}"));
        assert_eq!(value, json!({ "links": [], "categories": [] }));
    }

    #[tokio::test]
    async fn download_with_non_json_body_is_internal_error() {
        let router = Router::new().fallback(|| async { "<html>not json</html>" });
        let url = serve(router).await;
        let result = call(request_body("download", &url, None)).await;
        assert!(matches!(result, Err(ApiError::Internal(_))));
    }

    #[tokio::test]
    async fn unknown_operation_wins_over_missing_config() {
        let body = Bytes::from(json!({ "operation": "bogus", "config": {} }).to_string());
        let result = call(body).await;
        assert!(matches!(result, Err(ApiError::InvalidOperation)));

        let (url, _log) = recording_remote(StatusCode::OK).await;
        let result = call(request_body("bogus", &url, None)).await;
        assert!(matches!(result, Err(ApiError::InvalidOperation)));
    }

    #[tokio::test]
    async fn missing_config_fields_make_no_network_call() {
        let (url, log) = recording_remote(StatusCode::OK).await;
        let cases = [
            json!({ "operation": "check" }),
            json!({ "operation": "check", "config": { "username": "cloud", "password": "nav" } }),
            json!({ "operation": "upload", "config": { "url": url, "password": "nav" } }),
            json!({ "operation": "download", "config": { "url": url, "username": "cloud", "password": "" } }),
        ];
        for body in cases {
            let result = call(Bytes::from(body.to_string())).await;
            let err = result.err().expect("must fail");
            assert!(matches!(err, ApiError::MissingConfiguration));
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert!(log.lock().await.is_empty());
    }

    #[tokio::test]
    async fn wrongly_typed_operation_is_invalid_operation() {
        let (url, log) = recording_remote(StatusCode::OK).await;
        let cases = [
            json!({ "operation": "bogus", "config": { "url": 1, "username": "cloud", "password": "nav" } }),
            json!({ "operation": 5, "config": { "url": url, "username": "cloud", "password": "nav" } }),
            json!({ "operation": ["check"], "config": "x" }),
        ];
        for body in cases {
            let result = call(Bytes::from(body.to_string())).await;
            let err = result.err().expect("must fail");
            assert!(matches!(err, ApiError::InvalidOperation), "{body}");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert!(log.lock().await.is_empty());
    }

    #[tokio::test]
    async fn wrongly_typed_config_is_missing_configuration() {
        let (url, log) = recording_remote(StatusCode::OK).await;
        let cases = [
            json!({ "operation": "check", "config": "x" }),
            json!({ "operation": "check", "config": [url] }),
            json!({ "operation": "check", "config": null }),
            json!({ "operation": "upload", "config": { "url": 1, "username": "cloud", "password": "nav" } }),
            json!({ "operation": "download", "config": { "url": url, "username": true, "password": "nav" } }),
            json!({ "operation": "check", "config": { "url": url, "username": "cloud", "password": 42 } }),
        ];
        for body in cases {
            let result = call(Bytes::from(body.to_string())).await;
            let err = result.err().expect("must fail");
            assert!(matches!(err, ApiError::MissingConfiguration), "{body}");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert!(log.lock().await.is_empty());
    }

    #[tokio::test]
    async fn non_object_body_is_invalid_operation() {
        let result = call(Bytes::from_static(b"[1,2]")).await;
        assert!(matches!(result, Err(ApiError::InvalidOperation)));
    }

    #[tokio::test]
    async fn null_payload_is_uploaded_as_json_null() {
        let (url, log) = recording_remote(StatusCode::CREATED).await;
        let value = call(request_body("upload", &url, Some(Value::Null)))
            .await
            .unwrap_or_else(|err| panic!("upload failed: {err}"));
        assert_eq!(value, json!({ "success": true, "status": 201 }));
        assert_eq!(&log.lock().await[0].body[..], b"null");
    }

    #[tokio::test]
    async fn absent_payload_uploads_empty_body() {
        let (url, log) = recording_remote(StatusCode::CREATED).await;
        let value = call(request_body("upload", &url, None))
            .await
            .unwrap_or_else(|err| panic!("upload failed: {err}"));
        assert_eq!(value["success"], true);
        assert!(log.lock().await[0].body.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_internal_error() {
        let result = call(Bytes::from_static(b"{operation")).await;
        assert!(matches!(result, Err(ApiError::Internal(_))));
    }

    #[tokio::test]
    async fn unreachable_remote_is_internal_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        let result = call(request_body("check", &format!("http://{addr}"), None)).await;
        assert!(matches!(result, Err(ApiError::Internal(_))));
    }

    #[tokio::test]
    async fn backup_round_trip_through_webdav_server() {
        let url = dav_remote().await;

        let value = call(request_body("check", &url, None))
            .await
            .unwrap_or_else(|err| panic!("check failed: {err}"));
        assert_eq!(value["success"], true);

        let missing = call(request_body("download", &url, None)).await;
        assert!(matches!(missing, Err(ApiError::BackupNotFound)));

        let payload = json!({
            "links": [{ "id": "1", "title": "Rust", "url": "https://www.rust-lang.org" }],
            "categories": [{ "id": "dev", "name": "Dev" }],
        });
        let value = call(request_body("upload", &url, Some(payload.clone())))
            .await
            .unwrap_or_else(|err| panic!("upload failed: {err}"));
        assert_eq!(value["success"], true);

        let restored = call(request_body("download", &url, None))
            .await
            .unwrap_or_else(|err| panic!("download failed: {err}"));
        assert_eq!(restored, payload);
    }
}
