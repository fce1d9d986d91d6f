//! Client side of the external neural-analysis engine.
//!
//! The engine accepts one image as a multipart upload named `file` and answers
//! with either a verdict or a JSON `error` describing why the input was
//! rejected.

mod client;
mod types;

pub use client::{EngineClient, UPLOAD_FIELD};
pub use types::{EngineReply, EngineVerdict, ScanUpload};

use async_trait::async_trait;

use crate::error::EngineResult;

/// Anything that can turn a scan into a verdict.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Submit one scan and wait for the verdict.
    async fn analyze(&self, scan: ScanUpload) -> EngineResult<EngineVerdict>;
}
