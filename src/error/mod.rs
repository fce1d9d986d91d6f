use serde::Serialize;
use thiserror::Error;

/// Stable classification of every failure the service can surface.
///
/// The HTTP boundary maps each kind to exactly one status code; the string
/// form is part of the error body and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown patient or analysis.
    NotFound,
    /// Bad caller input, or input the engine rejected.
    ValidationError,
    /// Engine unreachable, slow, or unintelligible.
    EngineUnavailable,
    /// Duplicate patient id.
    Conflict,
    /// Snapshot could not be read or written.
    StorageUnavailable,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Snake-case name used in error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::EngineUnavailable => "engine_unavailable",
            ErrorKind::Conflict => "conflict",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-level errors
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Record store errors
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StorageError {
    #[error("Snapshot I/O failed: {message}")]
    Io { message: String },

    #[error("Snapshot rejected: {message}")]
    Corrupt { message: String },

    #[error("Patient not found: {patient_id}")]
    PatientNotFound { patient_id: String },

    #[error("Analysis not found: {analysis_id}")]
    AnalysisNotFound { analysis_id: u64 },

    #[error("Patient already exists: {patient_id}")]
    DuplicatePatient { patient_id: String },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// External analysis engine errors
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum EngineError {
    #[error("Engine rejected input: {message}")]
    Rejected { message: String },

    #[error("Engine unavailable: {message}")]
    Unavailable { message: String },

    #[error("Engine request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid engine response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StorageError {
    /// Stable kind of this storage failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::PatientNotFound { .. } | StorageError::AnalysisNotFound { .. } => {
                ErrorKind::NotFound
            }
            StorageError::DuplicatePatient { .. } => ErrorKind::Conflict,
            StorageError::Io { .. } | StorageError::Corrupt { .. } | StorageError::Json(_) => {
                ErrorKind::StorageUnavailable
            }
        }
    }
}

impl EngineError {
    /// Stable kind of this engine failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Rejected { .. } => ErrorKind::ValidationError,
            EngineError::Unavailable { .. }
            | EngineError::Timeout { .. }
            | EngineError::InvalidResponse { .. }
            | EngineError::Http(_) => ErrorKind::EngineUnavailable,
        }
    }
}

impl AppError {
    /// Stable kind of this error, used by the HTTP boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Storage(e) => e.kind(),
            AppError::Engine(e) => e.kind(),
            AppError::Validation { .. } => ErrorKind::ValidationError,
            AppError::Config { .. } | AppError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Shorthand for a validation failure on a named field
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::validation("prediction", "cannot be empty");
        assert_eq!(
            err.to_string(),
            "Validation failed: prediction - cannot be empty"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::PatientNotFound {
            patient_id: "P1".to_string(),
        };
        assert_eq!(err.to_string(), "Patient not found: P1");

        let err = StorageError::AnalysisNotFound { analysis_id: 7 };
        assert_eq!(err.to_string(), "Analysis not found: 7");

        let err = StorageError::DuplicatePatient {
            patient_id: "P1".to_string(),
        };
        assert_eq!(err.to_string(), "Patient already exists: P1");

        let err = StorageError::Io {
            message: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "Snapshot I/O failed: disk full");
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::Rejected {
            message: "Invalid image".to_string(),
        };
        assert_eq!(err.to_string(), "Engine rejected input: Invalid image");

        let err = EngineError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Engine request timeout after 5000ms");
    }

    #[test]
    fn test_storage_error_kinds() {
        assert_eq!(
            StorageError::PatientNotFound {
                patient_id: "x".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            StorageError::AnalysisNotFound { analysis_id: 1 }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            StorageError::DuplicatePatient {
                patient_id: "x".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            StorageError::Corrupt {
                message: "bad".into()
            }
            .kind(),
            ErrorKind::StorageUnavailable
        );
    }

    #[test]
    fn test_engine_error_kinds() {
        assert_eq!(
            EngineError::Rejected {
                message: "bad scan".into()
            }
            .kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            EngineError::Timeout { timeout_ms: 1 }.kind(),
            ErrorKind::EngineUnavailable
        );
        assert_eq!(
            EngineError::InvalidResponse {
                message: "not json".into()
            }
            .kind(),
            ErrorKind::EngineUnavailable
        );
    }

    #[test]
    fn test_app_error_kind_follows_source() {
        let app_err: AppError = StorageError::DuplicatePatient {
            patient_id: "P1".into(),
        }
        .into();
        assert!(matches!(app_err, AppError::Storage(_)));
        assert_eq!(app_err.kind(), ErrorKind::Conflict);

        let app_err: AppError = EngineError::Unavailable {
            message: "offline".into(),
        }
        .into();
        assert!(matches!(app_err, AppError::Engine(_)));
        assert_eq!(app_err.kind(), ErrorKind::EngineUnavailable);

        let app_err = AppError::Internal {
            message: "boom".into(),
        };
        assert_eq!(app_err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_error_kind_strings_are_stable() {
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::EngineUnavailable.to_string(), "engine_unavailable");
        assert_eq!(
            serde_json::to_string(&ErrorKind::StorageUnavailable).unwrap(),
            "\"storage_unavailable\""
        );
    }
}
