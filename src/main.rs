use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use neuro_records::{
    config::{Config, LogFormat},
    engine::EngineClient,
    server::{ApiServer, AppState},
    storage::JsonStore,
};

/// Patient record and analysis ingestion server
#[derive(Debug, Parser)]
#[command(name = "neuro-records", version, about)]
struct Cli {
    /// Listen address (overrides SERVER_ADDR)
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Snapshot file (overrides STORE_PATH)
    #[arg(long)]
    store: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(addr) = cli.addr {
        config.server.addr = addr;
    }
    if let Some(store) = cli.store {
        config.store.path = store;
    }

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Neuro records server starting..."
    );

    // Open the record store
    let store = match JsonStore::open(&config.store).await {
        Ok(s) => {
            info!(path = %config.store.path.display(), "Record store opened");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to open record store");
            return Err(e.into());
        }
    };

    // Initialize engine client
    let engine = match EngineClient::new(&config.engine, config.request.clone()) {
        Ok(c) => {
            info!(
                base_url = %config.engine.base_url,
                timeout_ms = config.request.timeout_ms,
                "Engine client initialized"
            );
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize engine client");
            return Err(e.into());
        }
    };

    let addr = config.server.addr;
    let state = Arc::new(AppState::new(config, store.clone(), Arc::new(engine)));

    if let Err(e) = ApiServer::new(state).run(addr).await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    store.close().await?;
    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
