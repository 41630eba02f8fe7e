//! Processing events as they go over the wire to SSE clients.

use serde::{Deserialize, Serialize};

use crate::collaborators::SaveOutcome;

/// Diagnostic context attached to a terminal error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Stage identifier, e.g. `"AIExtracting"`.
    pub step: String,
    /// Short, scrubbed hint such as `"rate limited"` or `"timeout"`.
    pub hint: String,
}

/// One event on a document's stream. Serialized with a `type` tag:
/// `connected`, `progress`, `complete` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProcessingEvent {
    Connected {
        #[serde(rename = "documentId")]
        document_id: String,
    },
    Progress {
        step: String,
        percentage: u8,
    },
    Complete {
        step: String,
        percentage: u8,
        result: SaveOutcome,
        #[serde(rename = "timetableData")]
        timetable_data: serde_json::Value,
    },
    Error {
        error: String,
        #[serde(rename = "errorDetails")]
        error_details: ErrorDetails,
    },
}

impl ProcessingEvent {
    pub fn connected(document_id: impl Into<String>) -> Self {
        Self::Connected {
            document_id: document_id.into(),
        }
    }

    pub fn progress(step: impl Into<String>, percentage: u8) -> Self {
        Self::Progress {
            step: step.into(),
            percentage: percentage.min(100),
        }
    }

    pub fn complete(result: SaveOutcome, timetable_data: serde_json::Value) -> Self {
        Self::Complete {
            step: "Completed".to_string(),
            percentage: 100,
            result,
            timetable_data,
        }
    }

    pub fn error(error: impl Into<String>, error_details: ErrorDetails) -> Self {
        Self::Error {
            error: error.into(),
            error_details,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// `complete` and `error` end a document's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    pub fn percentage(&self) -> Option<u8> {
        match self {
            Self::Progress { percentage, .. } | Self::Complete { percentage, .. } => {
                Some(*percentage)
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// `data: <json>\n\n`
    pub fn to_sse_frame(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }
}
