use thiserror::Error;

use crate::error::{CollaboratorError, ConvertError};
use crate::sanitize;
use crate::session::SessionError;

use super::stage::Stage;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Conversion(#[from] ConvertError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Job exceeded its time limit of {timeout_ms}ms")]
    QueueTimeout { timeout_ms: u64 },

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

const KNOWN_HINTS: &[&str] = &["model not found", "rate limited", "invalid credential"];

impl PipelineError {
    /// Only transient collaborator failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Collaborator(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Short client-facing hint. Never contains secrets.
    pub fn hint(&self) -> String {
        match self {
            PipelineError::Conversion(_) => "unsupported input".to_string(),
            PipelineError::Collaborator(CollaboratorError::Timeout { .. })
            | PipelineError::QueueTimeout { .. } => "timeout".to_string(),
            PipelineError::Collaborator(e) => {
                let message = e.to_string().to_lowercase();
                KNOWN_HINTS
                    .iter()
                    .find(|hint| message.contains(*hint))
                    .map(|hint| hint.to_string())
                    .unwrap_or_else(|| sanitize::client_safe(&e.to_string()))
            }
            PipelineError::Session(SessionError::EncryptionAuthFailure) => {
                "credential must be re-entered".to_string()
            }
            PipelineError::Session(e) => sanitize::client_safe(&e.to_string()),
            PipelineError::TaskFailed(_) => "internal error".to_string(),
        }
    }
}

/// A stage that gave up, after `attempts` tries.
#[derive(Error, Debug)]
#[error("{} failed: {error}", stage.label())]
pub struct StageFailure {
    pub stage: Stage,
    pub error: PipelineError,
    pub attempts: u32,
}

impl StageFailure {
    /// The message sent to clients: stage label plus the scrubbed cause.
    /// Conversion errors carry server paths, so only their hint is sent.
    pub fn client_message(&self) -> String {
        let cause = match &self.error {
            PipelineError::Conversion(_) => self.error.hint(),
            other => sanitize::client_safe(&other.to_string()),
        };
        format!("{} failed: {}", self.stage.label(), cause)
    }
}
