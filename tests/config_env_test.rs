//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Config::from_env() also loads a .env
//! file via dotenvy, so these tests only assert on variables they set.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use neuro_records::config::{Config, LogFormat, DEFAULT_MAX_UPLOAD_BYTES};
use neuro_records::error::ErrorKind;
use serial_test::serial;
use std::env;

#[test]
#[serial]
fn test_config_from_env_loads_successfully() {
    let result = Config::from_env();
    assert!(result.is_ok(), "Config::from_env() should succeed: {:?}", result.err());
}

#[test]
#[serial]
fn test_config_from_env_custom_engine_url() {
    env::set_var("ENGINE_BASE_URL", "http://engine.internal:9000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.engine.base_url, "http://engine.internal:9000");

    env::remove_var("ENGINE_BASE_URL");
}

#[test]
#[serial]
fn test_config_from_env_custom_store_path() {
    env::set_var("STORE_PATH", "/var/lib/neuro/db.json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.store.path.to_str().unwrap(), "/var/lib/neuro/db.json");

    env::remove_var("STORE_PATH");
}

#[test]
#[serial]
fn test_config_from_env_custom_server_addr() {
    env::set_var("SERVER_ADDR", "127.0.0.1:8080");

    let config = Config::from_env().unwrap();
    assert_eq!(config.server.addr.port(), 8080);
    assert!(config.server.addr.ip().is_loopback());

    env::remove_var("SERVER_ADDR");
}

#[test]
#[serial]
fn test_config_invalid_server_addr_is_error() {
    env::set_var("SERVER_ADDR", "not-an-address");

    let err = Config::from_env().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(err.to_string().contains("SERVER_ADDR"));

    env::remove_var("SERVER_ADDR");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    env::set_var("LOG_FORMAT", "JSON");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::remove_var("LOG_FORMAT");
}

#[test]
#[serial]
fn test_config_from_env_custom_request_timeout() {
    env::set_var("REQUEST_TIMEOUT_MS", "1500");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 1500);

    env::remove_var("REQUEST_TIMEOUT_MS");
}

#[test]
#[serial]
fn test_config_invalid_number_uses_default() {
    env::set_var("MAX_UPLOAD_BYTES", "ten megabytes");

    let config = Config::from_env().unwrap();
    assert_eq!(config.server.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);

    env::remove_var("MAX_UPLOAD_BYTES");
}
