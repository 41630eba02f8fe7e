use async_trait::async_trait;

use crate::collaborators::{ExtractionResult, SaveOutcome};
use crate::db::{audit_repo, timetable_repo, Database};
use crate::error::CollaboratorError;

const NAME: &str = "repository";

/// Durable storage for finished timetables.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Saves (or replaces) the timetable for `document_id`. Saving the same
    /// document twice yields the same `timetable_id`.
    async fn save(
        &self,
        document_id: &str,
        extraction: &ExtractionResult,
        validated: bool,
    ) -> Result<SaveOutcome, CollaboratorError>;

    /// Best-effort audit record of a stage outcome.
    async fn record_audit(
        &self,
        _document_id: &str,
        _stage: &str,
        _outcome: &str,
        _detail: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// [`ResultRepository`] on the SQLite database.
#[derive(Clone)]
pub struct SqliteRepository {
    db: Database,
}

impl SqliteRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn db_error(e: crate::db::DatabaseError) -> CollaboratorError {
    if e.is_transient() {
        CollaboratorError::unavailable(NAME, e.to_string())
    } else {
        CollaboratorError::rejected(NAME, e.to_string())
    }
}

fn join_error(e: tokio::task::JoinError) -> CollaboratorError {
    CollaboratorError::unavailable(NAME, format!("task aborted: {}", e))
}

#[async_trait]
impl ResultRepository for SqliteRepository {
    async fn save(
        &self,
        document_id: &str,
        extraction: &ExtractionResult,
        validated: bool,
    ) -> Result<SaveOutcome, CollaboratorError> {
        let db = self.db.clone();
        let document_id = document_id.to_string();
        let data = extraction.data.clone();
        let source = extraction.source.label();

        let timetable_id = tokio::task::spawn_blocking(move || {
            timetable_repo::upsert(&db, &document_id, &data, validated, &source)
        })
        .await
        .map_err(join_error)?
        .map_err(db_error)?;

        Ok(SaveOutcome {
            timetable_id,
            validated,
        })
    }

    async fn record_audit(
        &self,
        document_id: &str,
        stage: &str,
        outcome: &str,
        detail: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        let db = self.db.clone();
        let (document_id, stage, outcome) =
            (document_id.to_string(), stage.to_string(), outcome.to_string());
        let detail = detail.map(str::to_string);

        tokio::task::spawn_blocking(move || {
            audit_repo::append(&db, &document_id, &stage, &outcome, detail.as_deref())
        })
        .await
        .map_err(join_error)?
        .map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ExtractionSource;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_is_idempotent_per_document() {
        let repo = SqliteRepository::new(Database::open_in_memory().unwrap());
        let extraction = ExtractionResult {
            data: json!({ "rawText": "Mon Maths" }),
            source: ExtractionSource::Ocr,
            model: None,
        };

        let first = repo.save("doc-1", &extraction, true).await.unwrap();
        let second = repo.save("doc-1", &extraction, false).await.unwrap();

        assert_eq!(first.timetable_id, second.timetable_id);
        assert!(!second.validated);
        assert_eq!(timetable_repo::count(repo.database()).unwrap(), 1);
    }

    #[test]
    fn test_only_transient_store_errors_are_retryable() {
        use crate::db::DatabaseError;

        assert!(!db_error(DatabaseError::LockPoisoned).is_retryable());
        let dir_error = DatabaseError::Io {
            path: "/nope".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(db_error(dir_error).is_retryable());
    }

    #[tokio::test]
    async fn test_record_audit() {
        let repo = SqliteRepository::new(Database::open_in_memory().unwrap());
        repo.record_audit("doc-1", "QualityGate", "ocr_only", Some("AI provider disabled"))
            .await
            .unwrap();

        let rows = audit_repo::list_for_document(repo.database(), "doc-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].outcome, "ocr_only");
    }
}
