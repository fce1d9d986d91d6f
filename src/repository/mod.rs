//! Typed patient operations over the record store.
//!
//! Every read materializes `history` with the join rule (analyses whose
//! `patient_id` matches, newest id first); every write goes through one
//! [`JsonStore::transact`] call so it is all-or-nothing.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult, StorageError, StorageResult};
use crate::storage::{Analysis, AnalysisDraft, JsonStore, Patient, PatientStatus, Snapshot};

/// A patient joined with its analysis history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRecord {
    /// The stored patient.
    #[serde(flatten)]
    pub patient: Patient,
    /// Derived at read time, newest first.
    pub history: Vec<Analysis>,
}

impl PatientRecord {
    fn join(patient: &Patient, snapshot: &Snapshot) -> Self {
        Self {
            patient: patient.clone(),
            history: snapshot.history_of(&patient.id),
        }
    }
}

/// Registration payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    /// Caller-chosen identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Age in years; a numeric string is accepted.
    #[serde(deserialize_with = "crate::storage::number_or_numeric_string")]
    pub age: u32,
    /// Free-form gender label.
    pub gender: String,
    /// Initial status; Pending when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PatientStatus>,
    /// Initial notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewPatient {
    /// Registration with no status or notes.
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
            status: None,
            notes: None,
        }
    }

    /// Set the initial status.
    pub fn with_status(mut self, status: PatientStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the initial notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    fn into_patient(self) -> Patient {
        let mut patient = Patient::new(self.id, self.name, self.age, self.gender)
            .with_status(self.status.unwrap_or_default());
        if let Some(notes) = self.notes {
            patient = patient.with_notes(notes);
        }
        patient
    }
}

/// Patient repository
#[derive(Clone)]
pub struct PatientRepository {
    store: JsonStore,
}

impl PatientRepository {
    /// Wrap a store handle.
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// Underlying store handle
    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    /// Every patient with its history
    pub async fn list_patients(&self) -> AppResult<Vec<PatientRecord>> {
        Ok(self
            .store
            .read(|snapshot| {
                snapshot
                    .patients
                    .iter()
                    .map(|p| PatientRecord::join(p, snapshot))
                    .collect()
            })
            .await)
    }

    /// One patient with its history, `None` when the id is unknown
    pub async fn get_patient(&self, id: &str) -> AppResult<Option<PatientRecord>> {
        Ok(self
            .store
            .read(|snapshot| snapshot.patient(id).map(|p| PatientRecord::join(p, snapshot)))
            .await)
    }

    /// Whether a patient with this id is registered
    pub async fn patient_exists(&self, id: &str) -> bool {
        self.store.read(|snapshot| snapshot.patient(id).is_some()).await
    }

    /// One analysis by id, `None` when unknown
    pub async fn get_analysis(&self, id: u64) -> AppResult<Option<Analysis>> {
        Ok(self
            .store
            .read(|snapshot| snapshot.analysis(id).cloned())
            .await)
    }

    /// Register a patient; duplicate ids are a conflict
    pub async fn create_patient(&self, fields: NewPatient) -> AppResult<PatientRecord> {
        if fields.id.trim().is_empty() {
            return Err(AppError::validation("id", "Patient id cannot be empty"));
        }
        if fields.name.trim().is_empty() {
            return Err(AppError::validation("name", "Patient name cannot be empty"));
        }

        let patient = fields.into_patient();
        let stored = patient.clone();
        self.store
            .transact(move |snapshot| {
                if snapshot.patient(&stored.id).is_some() {
                    return Err(StorageError::DuplicatePatient {
                        patient_id: stored.id.clone(),
                    });
                }
                snapshot.patients.push(stored);
                Ok(())
            })
            .await?;

        info!(patient_id = %patient.id, status = %patient.status, "Patient registered");

        Ok(PatientRecord {
            patient,
            history: Vec::new(),
        })
    }

    /// Overwrite a patient's notes
    pub async fn set_notes(&self, id: &str, notes: impl Into<String>) -> AppResult<()> {
        let notes = notes.into();
        self.store
            .transact(|snapshot| {
                require_patient(snapshot, id)?.notes = notes;
                Ok(())
            })
            .await?;
        debug!(patient_id = %id, "Notes updated");
        Ok(())
    }

    /// Overwrite a patient's avatar
    pub async fn set_avatar(&self, id: &str, avatar: Option<String>) -> AppResult<()> {
        self.store
            .transact(|snapshot| {
                require_patient(snapshot, id)?.avatar = avatar;
                Ok(())
            })
            .await?;
        debug!(patient_id = %id, "Avatar updated");
        Ok(())
    }

    /// Set status to Verified; repeating it changes nothing
    pub async fn mark_verified(&self, id: &str) -> AppResult<()> {
        self.store
            .transact(|snapshot| {
                require_patient(snapshot, id)?.status = PatientStatus::Verified;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Append an analysis and verify its patient in one commit.
    ///
    /// The id is the current maximum plus one, read under the writer lock.
    /// When the draft supersedes an earlier analysis, that analysis must
    /// exist and belong to the same patient.
    pub async fn append_analysis(
        &self,
        patient_id: &str,
        draft: AnalysisDraft,
        date: &str,
    ) -> AppResult<Analysis> {
        let analysis = self
            .store
            .transact(|snapshot| {
                require_patient(snapshot, patient_id)?;

                if let Some(previous) = draft.supersedes {
                    let owned = snapshot
                        .analysis(previous)
                        .is_some_and(|a| a.patient_id == patient_id);
                    if !owned {
                        return Err(StorageError::AnalysisNotFound {
                            analysis_id: previous,
                        });
                    }
                }

                let id = snapshot.next_analysis_id();
                let analysis = Analysis::from_draft(id, patient_id, date, draft);
                snapshot.analyses.push(analysis.clone());
                require_patient(snapshot, patient_id)?.status = PatientStatus::Verified;
                Ok(analysis)
            })
            .await?;

        info!(
            patient_id = %patient_id,
            analysis_id = analysis.id,
            supersedes = ?analysis.supersedes,
            "Analysis committed"
        );

        Ok(analysis)
    }
}

fn require_patient<'a>(snapshot: &'a mut Snapshot, id: &str) -> StorageResult<&'a mut Patient> {
    snapshot
        .patient_mut(id)
        .ok_or_else(|| StorageError::PatientNotFound {
            patient_id: id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::Storage;
    use pretty_assertions::assert_eq;

    fn repository() -> PatientRepository {
        PatientRepository::new(JsonStore::in_memory())
    }

    async fn seeded(ids: &[&str]) -> PatientRepository {
        let repo = repository();
        for id in ids {
            repo.create_patient(NewPatient::new(*id, format!("Patient {}", id), 40, "Female"))
                .await
                .unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_create_then_get_returns_supplied_status_and_empty_history() {
        let repo = repository();
        let created = repo
            .create_patient(NewPatient::new("P1", "Jane Doe", 34, "Female"))
            .await
            .unwrap();
        assert!(created.history.is_empty());

        let fetched = repo.get_patient("P1").await.unwrap().unwrap();
        assert_eq!(fetched.patient.status, PatientStatus::Pending);
        assert_eq!(fetched.patient.age, 34);
        assert!(fetched.history.is_empty());
    }

    #[tokio::test]
    async fn test_create_keeps_supplied_status() {
        let repo = repository();
        repo.create_patient(
            NewPatient::new("P1", "Jane", 34, "Female").with_status(PatientStatus::Verified),
        )
        .await
        .unwrap();

        let fetched = repo.get_patient("P1").await.unwrap().unwrap();
        assert_eq!(fetched.patient.status, PatientStatus::Verified);
    }

    #[tokio::test]
    async fn test_duplicate_patient_is_conflict() {
        let repo = seeded(&["P1"]).await;
        let err = repo
            .create_patient(NewPatient::new("P1", "Someone Else", 50, "Male"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(repo.list_patients().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let err = repository()
            .create_patient(NewPatient::new("P1", "  ", 50, "Male"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_get_unknown_patient_is_none() {
        let repo = seeded(&["P1"]).await;
        assert!(repo.get_patient("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_notes_and_avatar() {
        let repo = seeded(&["P1"]).await;
        repo.set_notes("P1", "follow up in 6 weeks").await.unwrap();
        repo.set_avatar("P1", Some("data:image/png;base64,AAAA".into()))
            .await
            .unwrap();

        let patient = repo.get_patient("P1").await.unwrap().unwrap().patient;
        assert_eq!(patient.notes, "follow up in 6 weeks");
        assert_eq!(patient.avatar.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[tokio::test]
    async fn test_updates_on_unknown_patient_are_not_found() {
        let repo = repository();
        assert_eq!(
            repo.set_notes("ghost", "x").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            repo.set_avatar("ghost", None).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            repo.mark_verified("ghost").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_mark_verified_is_idempotent() {
        let repo = seeded(&["P1"]).await;
        repo.mark_verified("P1").await.unwrap();
        repo.mark_verified("P1").await.unwrap();
        let patient = repo.get_patient("P1").await.unwrap().unwrap().patient;
        assert_eq!(patient.status, PatientStatus::Verified);
    }

    #[tokio::test]
    async fn test_append_assigns_ids_and_verifies() {
        let repo = seeded(&["P1", "P2"]).await;

        let first = repo
            .append_analysis("P1", AnalysisDraft::new("Normal"), "09 Jan 2026")
            .await
            .unwrap();
        let second = repo
            .append_analysis("P2", AnalysisDraft::new("Normal"), "09 Jan 2026")
            .await
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        for id in ["P1", "P2"] {
            let patient = repo.get_patient(id).await.unwrap().unwrap().patient;
            assert_eq!(patient.status, PatientStatus::Verified);
        }
    }

    #[tokio::test]
    async fn test_append_for_unknown_patient_creates_nothing() {
        let repo = seeded(&["P1"]).await;
        let err = repo
            .append_analysis("ghost", AnalysisDraft::new("Normal"), "09 Jan 2026")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(repo.store().load().await.unwrap().analyses.is_empty());
    }

    #[tokio::test]
    async fn test_list_patients_joins_history_newest_first() {
        let repo = seeded(&["P1", "P2"]).await;
        for patient in ["P1", "P2", "P2", "P1"] {
            repo.append_analysis(patient, AnalysisDraft::new("Normal"), "09 Jan 2026")
                .await
                .unwrap();
        }

        let patients = repo.list_patients().await.unwrap();
        let histories: Vec<(String, Vec<u64>)> = patients
            .iter()
            .map(|r| {
                (
                    r.patient.id.clone(),
                    r.history.iter().map(|a| a.id).collect(),
                )
            })
            .collect();

        assert_eq!(
            histories,
            vec![
                ("P1".to_string(), vec![4, 1]),
                ("P2".to_string(), vec![3, 2]),
            ]
        );
    }

    #[tokio::test]
    async fn test_superseding_requires_same_patient() {
        let repo = seeded(&["P1", "P2"]).await;
        let original = repo
            .append_analysis("P1", AnalysisDraft::new("Normal"), "09 Jan 2026")
            .await
            .unwrap();

        let mut foreign = AnalysisDraft::new("Corrected");
        foreign.supersedes = Some(original.id);
        let err = repo
            .append_analysis("P2", foreign, "10 Jan 2026")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut correction = AnalysisDraft::new("Corrected");
        correction.supersedes = Some(original.id);
        let amended = repo
            .append_analysis("P1", correction, "10 Jan 2026")
            .await
            .unwrap();
        assert_eq!(amended.supersedes, Some(original.id));
        assert_eq!(
            repo.get_analysis(original.id).await.unwrap().unwrap().prediction,
            "Normal"
        );
    }

    #[tokio::test]
    async fn test_concurrent_appends_never_share_an_id() {
        let repo = seeded(&["P1", "P2"]).await;

        let mut handles = Vec::new();
        for n in 0..20 {
            let repo = repo.clone();
            let patient = if n % 2 == 0 { "P1" } else { "P2" };
            handles.push(tokio::spawn(async move {
                repo.append_analysis(patient, AnalysisDraft::new("Normal"), "09 Jan 2026")
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
    }

    #[test]
    fn test_patient_record_serializes_flat() {
        let record = PatientRecord {
            patient: Patient::new("P1", "Jane", 34, "Female"),
            history: Vec::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "P1");
        assert_eq!(value["status"], "Pending");
        assert_eq!(value["history"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_patient_exists() {
        let repo = seeded(&["P1"]).await;
        assert!(repo.patient_exists("P1").await);
        assert!(!repo.patient_exists("ghost").await);
    }
}
