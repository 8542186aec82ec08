//! CloudNav backend binary.
//!
//! Serves the bookmark storage gateway (`/api/storage`) backed by a key-value
//! store and the WebDAV backup bridge (`/api/webdav`). The main entry point
//! builds the Axum router from CLI/env configuration and runs the HTTP
//! listener until a shutdown signal arrives.

mod app_data;
mod atomic;
mod auth;
mod config;
mod error;
mod http;
mod logging;
mod storage;
mod version;
mod webdav;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span, warn};

use crate::auth::AuthConfig;
use crate::config::{Args, SHUTDOWN_GRACE_SECS, StoreKind};
use crate::http::extract_forwarded_ip;
use crate::storage::KvStore;
use crate::webdav::BridgeConfig;

shadow!(build);

/// Shared per-process state handed to the handlers as extensions.
#[derive(Clone)]
struct AppState {
    auth: Arc<AuthConfig>,
    store: Arc<KvStore>,
    bridge: Arc<BridgeConfig>,
}

/// Starts the CloudNav server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let store = match args.store {
        StoreKind::Dir => KvStore::dir(PathBuf::from(&args.data_dir)),
        StoreKind::Memory => KvStore::memory(),
    };
    store.ensure_ready().await?;

    let timeout =
        (args.webdav_timeout_secs > 0).then(|| Duration::from_secs(args.webdav_timeout_secs));
    let bridge = BridgeConfig::new(timeout).map_err(std::io::Error::other)?;

    let auth = AuthConfig::new(args.password.clone());
    if !auth.has_password() {
        warn!("no password configured, saving data is disabled");
    }

    let state = AppState {
        auth: Arc::new(auth),
        store: Arc::new(store),
        bridge: Arc::new(bridge),
    };
    let app = build_router(state, args.body_limit);

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!(store = ?args.store, data_dir = %args.data_dir, "storage configured");
    info!("🚀 Starting HTTP server at {}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

fn build_router(state: AppState, body_limit: usize) -> Router {
    let storage_routes = Router::new()
        .route(
            "/api/storage",
            get(app_data::get_app_data)
                .post(app_data::save_app_data)
                .options(http::cors_preflight),
        )
        .layer(middleware::from_fn(http::add_cors_headers));

    let body_limit = if body_limit == 0 {
        DefaultBodyLimit::disable()
    } else {
        DefaultBodyLimit::max(body_limit)
    };

    Router::new()
        .merge(storage_routes)
        .route("/api/webdav", post(webdav::webdav_proxy))
        .route("/api/version", get(version::get_build_info))
        .layer(body_limit)
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let forwarded_ip = extract_forwarded_ip(request.headers());
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = forwarded_ip
                        .or(connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(state.auth))
        .layer(Extension(state.store))
        .layer(Extension(state.bridge))
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
