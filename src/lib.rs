//! # Neuro Records
//!
//! Patient record store and analysis ingestion service. Analyses are either
//! entered manually or produced by forwarding an MRI scan to an external
//! neural-analysis engine and committing its verdict.
//!
//! ## Architecture
//!
//! ```text
//! HTTP client → axum router → IngestionService → EngineClient (HTTP)
//!                   ↓                ↓
//!            PatientRepository ←─────┘
//!                   ↓
//!           JsonStore (snapshot file)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use neuro_records::{Config, AppState, ApiServer};
//! use neuro_records::engine::EngineClient;
//! use neuro_records::storage::JsonStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = JsonStore::open(&config.store).await?;
//!     let engine = EngineClient::new(&config.engine, config.request.clone())?;
//!     let addr = config.server.addr;
//!     let state = Arc::new(AppState::new(config, store, Arc::new(engine)));
//!     ApiServer::new(state).run(addr).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management loaded from the environment.
pub mod config;
/// Client for the external analysis engine.
pub mod engine;
/// Error types, result aliases and stable error kinds.
pub mod error;
/// Analysis ingestion pipeline.
pub mod ingestion;
/// Patient operations and the history join.
pub mod repository;
/// HTTP router, handlers and shared state.
pub mod server;
/// Snapshot persistence for patients and analyses.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use server::{ApiServer, AppState, SharedState};
