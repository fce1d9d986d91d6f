use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::storage::{AnalysisDraft, Difficulty};

/// Image forwarded to the engine as a single-file upload
#[derive(Debug, Clone, PartialEq)]
pub struct ScanUpload {
    /// Original file name.
    pub file_name: String,
    /// MIME type, when the client sent one.
    pub content_type: Option<String>,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

impl ScanUpload {
    /// Create an upload with no content type.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    /// Set the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Successful diagnostic verdict from the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineVerdict {
    /// Headline verdict.
    pub prediction: String,
    /// Percentage, 0-100.
    pub confidence: f64,
    /// Encoded overlay image.
    #[serde(default)]
    pub heatmap: Option<String>,
    /// Reported severity.
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Raw class label.
    #[serde(default)]
    pub tumor_type: Option<String>,
    /// Class probability, 0-1.
    #[serde(default)]
    pub probability: Option<f64>,
}

impl EngineVerdict {
    /// Overlay the verdict on caller metadata.
    ///
    /// Engine fields win; `notes` and `supersedes` stay as the caller sent them.
    pub fn merge_into(self, draft: AnalysisDraft) -> AnalysisDraft {
        AnalysisDraft {
            prediction: self.prediction,
            confidence: Some(self.confidence),
            heatmap: self.heatmap,
            difficulty: self.difficulty,
            raw_tumor_type: self.tumor_type,
            raw_probability: self.probability,
            ..draft
        }
    }
}

/// Decoded engine reply: a verdict or a structured rejection
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReply {
    /// The engine produced a diagnosis.
    Verdict(EngineVerdict),
    /// The engine refused the input, with its reason.
    Rejected(String),
}

impl EngineReply {
    /// Classify a JSON reply body.
    ///
    /// An `error` string wins over every other field, since the engine also
    /// fills `prediction`/`confidence` placeholders on rejection.
    pub fn from_value(value: Value) -> EngineResult<Self> {
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Ok(EngineReply::Rejected(message.to_string()));
        }

        let verdict: EngineVerdict =
            serde_json::from_value(value).map_err(|e| EngineError::InvalidResponse {
                message: format!("Failed to parse verdict: {}", e),
            })?;

        if !(0.0..=100.0).contains(&verdict.confidence) {
            return Err(EngineError::InvalidResponse {
                message: format!("confidence {} outside 0-100", verdict.confidence),
            });
        }
        if let Some(p) = verdict.probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(EngineError::InvalidResponse {
                    message: format!("probability {} outside 0-1", p),
                });
            }
        }

        Ok(EngineReply::Verdict(verdict))
    }
}
