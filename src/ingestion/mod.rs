//! Analysis ingestion pipeline.
//!
//! Intake → optional engine call → single commit. The engine call always
//! finishes before the store is touched, and any failure before the commit
//! leaves the store unchanged.

use chrono::{DateTime, Local, TimeZone};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{AnalysisEngine, ScanUpload};
use crate::error::{AppError, AppResult, StorageError};
use crate::repository::PatientRepository;
use crate::storage::{Analysis, AnalysisDraft};

/// Date layout stamped on every committed analysis, e.g. `09 Jan 2026`.
pub const SUBMISSION_DATE_FORMAT: &str = "%d %b %Y";

/// One ingestion request: caller metadata plus an optional scan
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Image to forward to the engine; `None` for manual entry.
    pub scan: Option<ScanUpload>,
    /// Caller-supplied fields.
    pub metadata: AnalysisDraft,
}

impl IngestRequest {
    /// Manual entry: the metadata is the whole payload
    pub fn manual(metadata: AnalysisDraft) -> Self {
        Self {
            scan: None,
            metadata,
        }
    }

    /// Scan upload: the engine verdict is merged over the metadata
    pub fn with_scan(scan: ScanUpload, metadata: AnalysisDraft) -> Self {
        Self {
            scan: Some(scan),
            metadata,
        }
    }
}

/// Format a submission timestamp the way analyses carry it
pub fn submission_date<Tz: TimeZone>(now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(SUBMISSION_DATE_FORMAT).to_string()
}

/// Ingestion service
#[derive(Clone)]
pub struct IngestionService {
    repository: PatientRepository,
    engine: Arc<dyn AnalysisEngine>,
}

impl IngestionService {
    /// Create a service committing through `repository`.
    pub fn new(repository: PatientRepository, engine: Arc<dyn AnalysisEngine>) -> Self {
        Self { repository, engine }
    }

    /// Ingest a new analysis for `patient_id`
    pub async fn ingest(&self, patient_id: &str, request: IngestRequest) -> AppResult<Analysis> {
        self.run(patient_id, request, None).await
    }

    /// Ingest a correction of an earlier analysis of the same patient.
    ///
    /// The earlier record is left untouched; the new one points back at it.
    pub async fn supersede(
        &self,
        patient_id: &str,
        analysis_id: u64,
        request: IngestRequest,
    ) -> AppResult<Analysis> {
        let owned = self
            .repository
            .get_analysis(analysis_id)
            .await?
            .is_some_and(|a| a.patient_id == patient_id);
        if !owned {
            return Err(StorageError::AnalysisNotFound { analysis_id }.into());
        }

        self.run(patient_id, request, Some(analysis_id)).await
    }

    async fn run(
        &self,
        patient_id: &str,
        request: IngestRequest,
        supersedes: Option<u64>,
    ) -> AppResult<Analysis> {
        let ingestion_id = Uuid::new_v4();
        let start = Instant::now();

        if !self.repository.patient_exists(patient_id).await {
            return Err(StorageError::PatientNotFound {
                patient_id: patient_id.to_string(),
            }
            .into());
        }

        let mut metadata = request.metadata;
        metadata.supersedes = supersedes;

        let draft = match request.scan {
            None => {
                debug!(%ingestion_id, patient_id = %patient_id, "Manual analysis intake");
                validate_manual(&metadata)?;
                metadata
            }
            Some(scan) => {
                if scan.bytes.is_empty() {
                    return Err(AppError::validation("image", "Uploaded image is empty"));
                }
                debug!(
                    %ingestion_id,
                    patient_id = %patient_id,
                    file = %scan.file_name,
                    "Scan intake, calling engine"
                );
                let verdict = self.engine.analyze(scan).await.map_err(|e| {
                    warn!(
                        %ingestion_id,
                        patient_id = %patient_id,
                        error = %e,
                        kind = %e.kind(),
                        "Ingestion aborted before commit"
                    );
                    AppError::from(e)
                })?;
                verdict.merge_into(metadata)
            }
        };

        let date = submission_date(Local::now());
        let analysis = self
            .repository
            .append_analysis(patient_id, draft, &date)
            .await?;

        info!(
            %ingestion_id,
            patient_id = %patient_id,
            analysis_id = analysis.id,
            latency_ms = start.elapsed().as_millis() as u64,
            "Ingestion completed"
        );

        Ok(analysis)
    }
}

/// Checks for a manual payload, which no engine has vetted
fn validate_manual(draft: &AnalysisDraft) -> AppResult<()> {
    if draft.prediction.trim().is_empty() {
        return Err(AppError::validation(
            "prediction",
            "Prediction is required without an image",
        ));
    }
    if let Some(confidence) = draft.confidence {
        if !(0.0..=100.0).contains(&confidence) {
            return Err(AppError::validation(
                "confidence",
                format!("{} is outside 0-100", confidence),
            ));
        }
    }
    if let Some(probability) = draft.raw_probability {
        if !(0.0..=1.0).contains(&probability) {
            return Err(AppError::validation(
                "raw_probability",
                format!("{} is outside 0-1", probability),
            ));
        }
    }
    Ok(())
}
