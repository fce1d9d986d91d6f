use axum::{
    extract::{rejection::JsonRejection, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::SharedState;
use crate::engine::ScanUpload;
use crate::error::{AppError, ErrorKind, StorageError};
use crate::ingestion::IngestRequest;
use crate::repository::{NewPatient, PatientRecord};
use crate::storage::{Analysis, AnalysisDraft, Difficulty};

/// Multipart field carrying the scan
pub const IMAGE_FIELD: &str = "image";

/// Error response carrying a stable kind
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(AppError::validation("body", rejection.body_text()))
    }
}

/// Status code for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::EngineUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::StorageUnavailable | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let message = match &self.0 {
            AppError::Storage(e) => e.to_string(),
            AppError::Engine(e) => e.to_string(),
            other => other.to_string(),
        };

        if matches!(kind, ErrorKind::StorageUnavailable | ErrorKind::Internal) {
            error!(kind = %kind, error = %message, "Request failed");
        }

        (
            status_for(kind),
            Json(json!({ "error": message, "kind": kind })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api/patients
pub async fn list_patients(
    State(state): State<SharedState>,
) -> ApiResult<Json<Vec<PatientRecord>>> {
    Ok(Json(state.repository.list_patients().await?))
}

/// GET /api/patients/:id
pub async fn get_patient(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PatientRecord>> {
    match state.repository.get_patient(&id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(StorageError::PatientNotFound { patient_id: id }.into()),
    }
}

/// POST /api/patients
pub async fn create_patient(
    State(state): State<SharedState>,
    payload: Result<Json<NewPatient>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PatientRecord>)> {
    let Json(fields) = payload?;
    let record = state.repository.create_patient(fields).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /api/patients/:id/analysis
pub async fn ingest_analysis(
    State(state): State<SharedState>,
    Path(patient_id): Path<String>,
    request: Request,
) -> ApiResult<(StatusCode, Json<Analysis>)> {
    let ingest = read_ingest_request(request, &state).await?;
    let analysis = state.ingestion.ingest(&patient_id, ingest).await?;
    Ok((StatusCode::CREATED, Json(analysis)))
}

/// POST /api/patients/:id/analysis/:analysis_id/supersede
pub async fn supersede_analysis(
    State(state): State<SharedState>,
    Path((patient_id, analysis_id)): Path<(String, u64)>,
    request: Request,
) -> ApiResult<(StatusCode, Json<Analysis>)> {
    let ingest = read_ingest_request(request, &state).await?;
    let analysis = state
        .ingestion
        .supersede(&patient_id, analysis_id, ingest)
        .await?;
    info!(
        patient_id = %patient_id,
        superseded = analysis_id,
        analysis_id = analysis.id,
        "Analysis superseded"
    );
    Ok((StatusCode::CREATED, Json(analysis)))
}

/// Body of `PATCH /api/patients/:id/notes`.
#[derive(Debug, Deserialize)]
pub struct NotesUpdate {
    /// New notes; `null` clears them.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `PATCH /api/patients/:id/avatar`.
#[derive(Debug, Deserialize)]
pub struct AvatarUpdate {
    /// New avatar; `null` removes it.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// PATCH /api/patients/:id/notes
pub async fn update_notes(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Result<Json<NotesUpdate>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(update) = payload?;
    state
        .repository
        .set_notes(&id, update.notes.unwrap_or_default())
        .await?;
    Ok(Json(json!({ "success": true })))
}

/// PATCH /api/patients/:id/avatar
pub async fn update_avatar(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Result<Json<AvatarUpdate>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(update) = payload?;
    state.repository.set_avatar(&id, update.avatar).await?;
    Ok(Json(json!({ "success": true })))
}

/// Multipart (image + text fields) or a JSON metadata body
async fn read_ingest_request(request: Request, state: &SharedState) -> ApiResult<IngestRequest> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let Json(metadata) = Json::<AnalysisDraft>::from_request(request, state).await?;
        return Ok(IngestRequest::manual(metadata));
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::validation("body", e.body_text()))?;

    let mut scan = None;
    let mut metadata = AnalysisDraft::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation("body", e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == IMAGE_FIELD {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::validation(IMAGE_FIELD, e.body_text()))?;
            let mut upload = ScanUpload::new(file_name, bytes.to_vec());
            if let Some(content_type) = content_type {
                upload = upload.with_content_type(content_type);
            }
            scan = Some(upload);
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::validation(name.clone(), e.body_text()))?;
        apply_text_field(&mut metadata, &name, value)?;
    }

    Ok(IngestRequest { scan, metadata })
}

/// Fold one multipart text field into the draft; unknown fields are ignored
fn apply_text_field(draft: &mut AnalysisDraft, name: &str, value: String) -> Result<(), AppError> {
    let parse_number = |raw: &str| {
        raw.trim()
            .parse::<f64>()
            .map_err(|_| AppError::validation(name, format!("'{}' is not a number", raw)))
    };

    match name {
        "prediction" => draft.prediction = value,
        "confidence" => draft.confidence = Some(parse_number(&value)?),
        "difficulty" => {
            // Non-finite numbers have no JSON form; keep them as labels.
            draft.difficulty = Some(match value.trim().parse::<f64>() {
                Ok(severity) if severity.is_finite() => Difficulty::Severity(severity),
                _ => Difficulty::Label(value),
            })
        }
        "heatmap" => draft.heatmap = Some(value),
        "raw_tumor_type" => draft.raw_tumor_type = Some(value),
        "raw_probability" => draft.raw_probability = Some(parse_number(&value)?),
        "notes" => draft.notes = Some(value),
        _ => {}
    }
    Ok(())
}
