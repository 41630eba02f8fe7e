use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::collaborators::{ExtractionResult, ExtractionSource, ValidationReport};
use crate::error::CollaboratorError;

#[async_trait]
pub trait ExtractionValidator: Send + Sync {
    async fn validate(
        &self,
        extraction: &ExtractionResult,
    ) -> Result<ValidationReport, CollaboratorError>;
}

static TIME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([01]?\d|2[0-3]):[0-5]\d$").ok());

const WEEKDAYS: &[&str] = &[
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Structural checks on extracted timetables.
///
/// AI output must carry a `timeblocks` array whose entries have a weekday, a
/// name and `H:MM` times with start before end. OCR output only needs
/// non-empty text.
#[derive(Debug, Clone, Default)]
pub struct TimetableValidator;

impl TimetableValidator {
    pub fn check(&self, extraction: &ExtractionResult) -> ValidationReport {
        let issues = match extraction.source {
            ExtractionSource::Ocr => check_ocr(&extraction.data),
            ExtractionSource::Ai(_) => check_timeblocks(&extraction.data),
        };
        ValidationReport {
            valid: issues.is_empty(),
            issues,
        }
    }
}

#[async_trait]
impl ExtractionValidator for TimetableValidator {
    async fn validate(
        &self,
        extraction: &ExtractionResult,
    ) -> Result<ValidationReport, CollaboratorError> {
        Ok(self.check(extraction))
    }
}

fn check_ocr(data: &Value) -> Vec<String> {
    match data.get("rawText").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Vec::new(),
        _ => vec!["no text recognized".to_string()],
    }
}

fn check_timeblocks(data: &Value) -> Vec<String> {
    let Some(blocks) = data.get("timeblocks").and_then(Value::as_array) else {
        return vec!["missing timeblocks array".to_string()];
    };

    let mut issues = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        let day = block.get("day").and_then(Value::as_str).unwrap_or("");
        if !WEEKDAYS.contains(&day.to_ascii_lowercase().as_str()) {
            issues.push(format!("timeblocks[{}]: unknown day '{}'", i, day));
        }
        if block
            .get("name")
            .and_then(Value::as_str)
            .map_or(true, |n| n.trim().is_empty())
        {
            issues.push(format!("timeblocks[{}]: missing name", i));
        }

        let start = block.get("startTime").and_then(Value::as_str).and_then(minutes);
        let end = block.get("endTime").and_then(Value::as_str).and_then(minutes);
        match (start, end) {
            (Some(s), Some(e)) if s < e => {}
            (Some(_), Some(_)) => {
                issues.push(format!("timeblocks[{}]: start is not before end", i))
            }
            _ => issues.push(format!("timeblocks[{}]: times must be H:MM", i)),
        }
    }
    issues
}

/// Minutes since midnight for `H:MM` / `HH:MM`.
fn minutes(time: &str) -> Option<u32> {
    let re = TIME_PATTERN.as_ref()?;
    if !re.is_match(time) {
        return None;
    }
    let (h, m) = time.split_once(':')?;
    Some(h.parse::<u32>().ok()? * 60 + m.parse::<u32>().ok()?)
}
