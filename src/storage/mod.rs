//! Record store for patients and their analyses.
//!
//! Persistence is a single JSON snapshot holding both collections. The
//! [`JsonStore`] keeps the snapshot in memory, serializes every
//! load-mutate-commit sequence behind one writer lock, and replaces the file
//! atomically on each commit.

mod json;


pub use json::JsonStore;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{StorageError, StorageResult};

/// Snapshot layout version written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Verification state of a patient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatientStatus {
    /// No analysis has been committed yet.
    #[default]
    Pending,
    /// At least one analysis has been committed. Never reverts.
    Verified,
}

impl std::fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatientStatus::Pending => write!(f, "Pending"),
            PatientStatus::Verified => write!(f, "Verified"),
        }
    }
}

/// A registered patient as stored in the snapshot.
///
/// `history` is not part of this record; see
/// [`crate::repository::PatientRecord`] for the joined view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Caller-supplied identifier, unique within the store.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Age in years. Accepts a JSON number or a numeric string.
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub age: u32,
    /// Free-form gender label.
    pub gender: String,
    /// Verification state, flipped by ingestion.
    #[serde(default)]
    pub status: PatientStatus,
    /// Clinician notes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
    /// Encoded avatar image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Patient {
    /// Create a pending patient with no notes or avatar.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        age: u32,
        gender: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            age,
            gender: gender.into(),
            status: PatientStatus::Pending,
            notes: String::new(),
            avatar: None,
        }
    }

    /// Set the initial status.
    pub fn with_status(mut self, status: PatientStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the initial notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Severity reported for an analysis: a label ("Low", "High") or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Difficulty {
    /// Named level, e.g. "Low".
    Label(String),
    /// Numeric severity.
    Severity(f64),
}

impl From<&str> for Difficulty {
    fn from(label: &str) -> Self {
        Difficulty::Label(label.to_string())
    }
}

/// Diagnostic payload of an analysis before the store assigns identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDraft {
    /// Headline verdict; required for manual entry.
    #[serde(default)]
    pub prediction: String,
    /// Confidence percentage (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Reported severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    /// Encoded overlay image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<String>,
    /// Engine class label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_tumor_type: Option<String>,
    /// Engine class probability (0-1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_probability: Option<f64>,
    /// Free-text annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Set by the service on corrections; ignored from callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<u64>,
}

impl AnalysisDraft {
    /// Create a draft with a prediction and nothing else.
    pub fn new(prediction: impl Into<String>) -> Self {
        Self {
            prediction: prediction.into(),
            ..Default::default()
        }
    }

    /// Set the confidence percentage.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set the free-text annotation.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// A committed analysis. Append-only: never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Store-wide monotonic identifier.
    pub id: u64,
    /// Owning patient.
    pub patient_id: String,
    /// Headline verdict, e.g. "Tumor Detected: Glioma".
    pub prediction: String,
    /// Confidence percentage (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Reported severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    /// Encoded overlay image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<String>,
    /// Engine class label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_tumor_type: Option<String>,
    /// Engine class probability (0-1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_probability: Option<f64>,
    /// Submission date, `DD Mon YYYY`.
    pub date: String,
    /// Free-text annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Earlier analysis of the same patient that this one corrects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<u64>,
}

impl Analysis {
    /// Give a draft its identity.
    pub fn from_draft(
        id: u64,
        patient_id: impl Into<String>,
        date: impl Into<String>,
        draft: AnalysisDraft,
    ) -> Self {
        Self {
            id,
            patient_id: patient_id.into(),
            prediction: draft.prediction,
            confidence: draft.confidence,
            difficulty: draft.difficulty,
            heatmap: draft.heatmap,
            raw_tumor_type: draft.raw_tumor_type,
            raw_probability: draft.raw_probability,
            date: date.into(),
            notes: draft.notes,
            supersedes: draft.supersedes,
        }
    }
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// The whole persisted state: both collections plus a layout version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Layout version; see [`SCHEMA_VERSION`].
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Registered patients, in insertion order.
    #[serde(default)]
    pub patients: Vec<Patient>,
    /// Every committed analysis, append-only.
    #[serde(default)]
    pub analyses: Vec<Analysis>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    /// `{patients: [], analyses: []}` at the current schema version.
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            patients: Vec::new(),
            analyses: Vec::new(),
        }
    }

    /// Reject snapshots the rest of the crate cannot rely on.
    pub fn validate(&self) -> StorageResult<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(StorageError::Corrupt {
                message: format!(
                    "unsupported schema version {} (expected {})",
                    self.schema_version, SCHEMA_VERSION
                ),
            });
        }

        let mut patient_ids = HashSet::with_capacity(self.patients.len());
        for patient in &self.patients {
            if !patient_ids.insert(patient.id.as_str()) {
                return Err(StorageError::Corrupt {
                    message: format!("duplicate patient id '{}'", patient.id),
                });
            }
        }

        let mut analysis_ids = HashSet::with_capacity(self.analyses.len());
        for analysis in &self.analyses {
            if !analysis_ids.insert(analysis.id) {
                return Err(StorageError::Corrupt {
                    message: format!("duplicate analysis id {}", analysis.id),
                });
            }
        }

        Ok(())
    }

    /// Next analysis id: max existing + 1, or 1 for an empty collection.
    pub fn next_analysis_id(&self) -> u64 {
        self.analyses.iter().map(|a| a.id).max().unwrap_or(0) + 1
    }

    /// Patient by id.
    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    /// Mutable patient by id.
    pub fn patient_mut(&mut self, id: &str) -> Option<&mut Patient> {
        self.patients.iter_mut().find(|p| p.id == id)
    }

    /// Analysis by id.
    pub fn analysis(&self, id: u64) -> Option<&Analysis> {
        self.analyses.iter().find(|a| a.id == id)
    }

    /// Analyses of one patient, newest id first.
    pub fn history_of(&self, patient_id: &str) -> Vec<Analysis> {
        let mut history: Vec<Analysis> = self
            .analyses
            .iter()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.id.cmp(&a.id));
        history
    }
}

/// Whole-snapshot persistence.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Return the full current snapshot.
    async fn load(&self) -> StorageResult<Snapshot>;
    /// Atomically replace the persisted snapshot.
    async fn commit(&self, snapshot: Snapshot) -> StorageResult<()>;
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid age '{}'", s))),
    }
}
