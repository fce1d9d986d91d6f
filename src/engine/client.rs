use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{EngineReply, EngineVerdict, ScanUpload};
use super::AnalysisEngine;
use crate::config::{EngineConfig, RequestConfig};
use crate::error::{EngineError, EngineResult};

/// Multipart field name the engine reads the image from
pub const UPLOAD_FIELD: &str = "file";

/// HTTP client for the external analysis engine
#[derive(Clone)]
pub struct EngineClient {
    client: Client,
    base_url: String,
    request_config: RequestConfig,
}

impl EngineClient {
    /// Create a new engine client
    pub fn new(config: &EngineConfig, request_config: RequestConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_transport(&self, e: reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else if e.is_connect() {
            EngineError::Unavailable {
                message: format!("cannot reach {}: {}", self.base_url, e),
            }
        } else {
            EngineError::Http(e)
        }
    }

    /// Execute a single upload (internal)
    async fn execute_request(&self, scan: ScanUpload) -> EngineResult<EngineVerdict> {
        let url = format!("{}/analyze", self.base_url);

        let mut part = Part::bytes(scan.bytes).file_name(scan.file_name);
        if let Some(content_type) = scan.content_type.as_deref() {
            part = part.mime_str(content_type).map_err(EngineError::Http)?;
        }
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.map_transport(e))?;

        let value: serde_json::Value = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) if status.is_success() => {
                return Err(EngineError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })
            }
            Err(_) => {
                return Err(EngineError::Unavailable {
                    message: format!(
                        "status {}: {}",
                        status.as_u16(),
                        String::from_utf8_lossy(&body)
                    ),
                })
            }
        };

        // A structured `error` is a rejection of the input on any status.
        match EngineReply::from_value(value) {
            Ok(EngineReply::Rejected(message)) => Err(EngineError::Rejected { message }),
            Ok(EngineReply::Verdict(_)) | Err(_) if !status.is_success() => {
                Err(EngineError::Unavailable {
                    message: format!("status {}", status.as_u16()),
                })
            }
            Ok(EngineReply::Verdict(verdict)) => Ok(verdict),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AnalysisEngine for EngineClient {
    async fn analyze(&self, scan: ScanUpload) -> EngineResult<EngineVerdict> {
        let file_name = scan.file_name.clone();
        let size = scan.bytes.len();
        debug!(file = %file_name, bytes = size, "Uploading scan to engine");

        let start = Instant::now();
        let result = self.execute_request(scan).await;
        let latency = start.elapsed();

        match &result {
            Ok(verdict) => info!(
                file = %file_name,
                prediction = %verdict.prediction,
                confidence = verdict.confidence,
                latency_ms = latency.as_millis(),
                "Engine analysis succeeded"
            ),
            Err(EngineError::Rejected { message }) => warn!(
                file = %file_name,
                reason = %message,
                latency_ms = latency.as_millis(),
                "Engine rejected scan"
            ),
            Err(e) => error!(
                file = %file_name,
                error = %e,
                latency_ms = latency.as_millis(),
                "Engine call failed"
            ),
        }

        result
    }
}
