use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Analysis engine endpoint.
    pub engine: EngineConfig,
    /// Snapshot file location.
    pub store: StoreConfig,
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Log level and format.
    pub logging: LoggingConfig,
    /// Outbound request limits.
    pub request: RequestConfig,
}

/// External analysis engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL; `/analyze` is appended.
    pub base_url: String,
}

/// Snapshot file configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the JSON snapshot.
    pub path: PathBuf,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Outbound HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Engine call timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Default engine base URL.
pub const DEFAULT_ENGINE_BASE_URL: &str = "http://localhost:8000";
/// Default snapshot path.
pub const DEFAULT_STORE_PATH: &str = "./data/db.json";
/// Default listen address.
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:5000";
/// Default body limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Default engine timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let engine = EngineConfig {
            base_url: env::var("ENGINE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ENGINE_BASE_URL.to_string()),
        };

        let store = StoreConfig {
            path: PathBuf::from(
                env::var("STORE_PATH").unwrap_or_else(|_| DEFAULT_STORE_PATH.to_string()),
            ),
        };

        let raw_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string());
        let server = ServerConfig {
            addr: raw_addr.parse().map_err(|e| AppError::Config {
                message: format!("SERVER_ADDR '{}' is not a socket address: {}", raw_addr, e),
            })?,
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        };

        Ok(Config {
            engine,
            store,
            server,
            logging,
            request,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ENGINE_BASE_URL.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
