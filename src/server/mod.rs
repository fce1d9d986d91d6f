//! HTTP boundary.
//!
//! This module provides:
//! - Shared application state (repository, ingestion service, config)
//! - The axum router and its middleware stack
//! - Error-kind to status-code mapping

mod handlers;


pub use handlers::*;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::Config;
use crate::engine::AnalysisEngine;
use crate::error::{AppError, AppResult};
use crate::ingestion::IngestionService;
use crate::repository::PatientRepository;
use crate::storage::JsonStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Patient reads and partial updates.
    pub repository: PatientRepository,
    /// Analysis ingestion pipeline.
    pub ingestion: IngestionService,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, store: JsonStore, engine: Arc<dyn AnalysisEngine>) -> Self {
        let repository = PatientRepository::new(store);
        let ingestion = IngestionService::new(repository.clone(), engine);

        Self {
            config,
            repository,
            ingestion,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

/// Build the full router with middleware
pub fn router(state: SharedState) -> Router {
    let max_upload_bytes = state.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}

fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/patients", get(list_patients).post(create_patient))
        .route("/patients/:id", get(get_patient))
        .route("/patients/:id/analysis", post(ingest_analysis))
        .route(
            "/patients/:id/analysis/:analysis_id/supersede",
            post(supersede_analysis),
        )
        .route("/patients/:id/notes", patch(update_notes))
        .route("/patients/:id/avatar", patch(update_avatar))
}

/// HTTP server bound to one address
pub struct ApiServer {
    state: SharedState,
}

impl ApiServer {
    /// Create a server over shared state.
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve until Ctrl-C
    pub async fn run(self, addr: SocketAddr) -> AppResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Internal {
                message: format!("Failed to bind {}: {}", addr, e),
            })?;

        info!(addr = %addr, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| AppError::Internal {
                message: format!("HTTP server failed: {}", e),
            })
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
