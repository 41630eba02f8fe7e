use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Unit of work: process one uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineJob {
    pub document_id: String,
    pub file_path: PathBuf,
    /// Session whose AI settings apply, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
}

impl PipelineJob {
    pub fn new(
        document_id: impl Into<String>,
        file_path: impl Into<PathBuf>,
    ) -> Result<Self, QueueError> {
        let document_id = document_id.into();
        if document_id.trim().is_empty() {
            return Err(QueueError::InvalidJob("document id is empty".to_string()));
        }
        Ok(Self {
            document_id,
            file_path: file_path.into(),
            session_id: None,
            enqueued_at: Utc::now(),
        })
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into()).filter(|s: &String| !s.is_empty());
        self
    }
}

/// Why a job ended without completing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("job for document {document_id} failed at {stage}: {message}")]
pub struct JobError {
    pub document_id: String,
    pub stage: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_id_rejected() {
        assert!(matches!(
            PipelineJob::new("  ", "/tmp/x.png"),
            Err(QueueError::InvalidJob(_))
        ));
    }

    #[test]
    fn test_job_json_shape() {
        let job = PipelineJob::new("doc-1", "/uploads/doc-1.png")
            .unwrap()
            .with_session("sess");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["documentId"], "doc-1");
        assert_eq!(value["sessionId"], "sess");

        let parsed: PipelineJob =
            serde_json::from_str(r#"{"documentId":"d","filePath":"/f.png"}"#).unwrap();
        assert!(parsed.session_id.is_none());
    }

    #[test]
    fn test_empty_session_is_none() {
        let job = PipelineJob::new("doc", "/f.png").unwrap().with_session("");
        assert!(job.session_id.is_none());
    }
}
