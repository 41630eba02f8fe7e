//! The external capabilities each pipeline stage delegates to, with default
//! implementations.
//!
//! Every collaborator is a trait object so tests (and alternative backends)
//! can be swapped in without touching the orchestrator.

pub mod compress;
pub mod ocr;
pub mod persistence;
pub mod preprocess;
pub mod validate;
pub mod vision;

#[cfg(feature = "tesseract")]
mod tesseract;

#[cfg(not(feature = "tesseract"))]
mod tesseract_stub;

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::session::Provider;

pub use compress::{ImageCompressor, ResizingCompressor};
pub use ocr::{parse_tsv, OcrEngine};
pub use persistence::{ResultRepository, SqliteRepository};
pub use preprocess::{ContrastPreprocessor, ImagePreprocessor};
pub use validate::{ExtractionValidator, TimetableValidator};
pub use vision::{ClaudeExtractor, ExtractorRegistry, VisionExtractor};

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractOcr;

#[cfg(not(feature = "tesseract"))]
pub use tesseract_stub::TesseractOcr;

/// False when built without the `tesseract` feature, in which case every
/// OCR call is rejected.
pub const OCR_AVAILABLE: bool = cfg!(feature = "tesseract");

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutput {
    pub path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrWord {
    pub text: String,
    /// 0.0 to 1.0
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrOutput {
    pub text: String,
    /// Mean word confidence, 0.0 to 1.0.
    pub confidence: f64,
    pub words: Vec<OcrWord>,
}

impl OcrOutput {
    /// Builds the output from recognized words; confidence is their mean.
    pub fn from_words(text: String, words: Vec<OcrWord>) -> Self {
        let confidence = if words.is_empty() {
            0.0
        } else {
            words.iter().map(|w| w.confidence).sum::<f64>() / words.len() as f64
        };
        Self {
            text,
            confidence,
            words,
        }
    }
}

/// Where a timetable's structured data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    /// Taken straight from OCR (high confidence or no AI available).
    Ocr,
    Ai(Provider),
}

impl ExtractionSource {
    pub fn label(&self) -> String {
        match self {
            ExtractionSource::Ocr => "ocr".to_string(),
            ExtractionSource::Ai(provider) => format!("ai:{}", provider),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub data: serde_json::Value,
    pub source: ExtractionSource,
    pub model: Option<String>,
}

impl ExtractionResult {
    /// Wraps OCR output as the document's data.
    pub fn from_ocr(ocr: &OcrOutput) -> Self {
        Self {
            data: serde_json::json!({
                "rawText": ocr.text,
                "confidence": ocr.confidence,
                "wordCount": ocr.words.len(),
            }),
            source: ExtractionSource::Ocr,
            model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// What persistence hands back; forwarded to clients on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub timetable_id: String,
    pub validated: bool,
}

/// Input for a vision extraction call.
pub struct ExtractionRequest {
    pub image_path: PathBuf,
    /// Falls back to the extractor's default model.
    pub model: Option<String>,
    /// Falls back to the extractor's configured key.
    pub credential: Option<SecretString>,
}

impl std::fmt::Debug for ExtractionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionRequest")
            .field("image_path", &self.image_path)
            .field("model", &self.model)
            .field("credential", &self.credential.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Reports extractor progress as a percentage of its own work (0 to 100).
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);
