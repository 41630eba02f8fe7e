use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TtpipeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Session error: {0}")]
    Session(#[from] crate::session::SessionError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Failures of the feature converter. None of these are retried.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to read input '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not decode {format} input: {cause}")]
    ConversionFailed { format: String, cause: String },

    #[error("Failed to write converted file '{path}': {cause}")]
    WriteOutput { path: PathBuf, cause: String },
}

/// Failures reported by an external collaborator (OCR engine, vision model,
/// validator, repository).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Transient; the caller may retry.
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
    },

    /// The collaborator understood the request and refused it.
    #[error("{collaborator} rejected the request: {message}")]
    Rejected {
        collaborator: &'static str,
        message: String,
    },

    #[error("{collaborator} timed out after {after_ms}ms")]
    Timeout {
        collaborator: &'static str,
        after_ms: u64,
    },
}

impl CollaboratorError {
    pub fn unavailable(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator,
            message: message.into(),
        }
    }

    pub fn rejected(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            collaborator,
            message: message.into(),
        }
    }

    pub fn collaborator(&self) -> &'static str {
        match self {
            Self::Unavailable { collaborator, .. }
            | Self::Rejected { collaborator, .. }
            | Self::Timeout { collaborator, .. } => collaborator,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Queue is shut down and no longer accepts jobs")]
    Closed,

    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

pub type Result<T> = std::result::Result<T, TtpipeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_is_not_retryable() {
        assert!(!CollaboratorError::rejected("vision", "model not found").is_retryable());
        assert!(CollaboratorError::unavailable("vision", "503").is_retryable());
        assert!(CollaboratorError::Timeout {
            collaborator: "ocr",
            after_ms: 10
        }
        .is_retryable());
    }

    #[test]
    fn test_collaborator_name_in_message() {
        let err = CollaboratorError::unavailable("ocr", "engine missing");
        assert_eq!(err.collaborator(), "ocr");
        assert_eq!(err.to_string(), "ocr unavailable: engine missing");
    }
}
