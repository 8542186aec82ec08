//! CLI arguments and server configuration defaults.

use clap::{Parser, ValueEnum};
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const APP_DATA_KEY: &str = "app_data";
pub const AUTH_PASSWORD_HEADER: &str = "x-auth-password";
pub const BACKUP_FILE_NAME: &str = "cloudnav_backup.json";
pub const WEBDAV_USER_AGENT: &str = "CloudNav/1.0";
pub const DEFAULT_HTTP_PORT: u16 = 8788;
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Backend used for the key-value store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// One file per key under the data directory.
    Dir,
    /// Volatile in-process map, lost on restart.
    Memory,
}

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "cloudnav-server", version = VERSION_INFO, about = "CloudNav backend")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "CLOUDNAV_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "CLOUDNAV_PORT",
        default_value_t = DEFAULT_HTTP_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "CLOUDNAV_PASSWORD",
        default_value = "",
        hide_env_values = true,
        help = "Shared password for saving data (empty disables writes)"
    )]
    pub password: String,
    #[arg(
        long,
        value_enum,
        env = "CLOUDNAV_STORE",
        default_value_t = StoreKind::Dir,
        help = "Key-value store backend"
    )]
    pub store: StoreKind,
    #[arg(
        short = 'd',
        long,
        env = "CLOUDNAV_DATA_DIR",
        default_value = ".cloudnav/data",
        help = "Data directory for the dir store"
    )]
    pub data_dir: String,
    #[arg(
        long,
        env = "CLOUDNAV_WEBDAV_TIMEOUT_SECS",
        default_value_t = 0,
        help = "Timeout for outbound WebDAV requests in seconds (0 to disable)"
    )]
    pub webdav_timeout_secs: u64,
    #[arg(
        long,
        env = "CLOUDNAV_BODY_LIMIT",
        default_value_t = DEFAULT_BODY_LIMIT,
        help = "Max request body size in bytes (0 to disable)"
    )]
    pub body_limit: usize,
}
