//! Placeholder used when the crate is built without the `tesseract` feature.

use std::path::Path;

use async_trait::async_trait;

use crate::collaborators::ocr::OcrEngine;
use crate::collaborators::OcrOutput;
use crate::config::OcrConfig;
use crate::error::CollaboratorError;

#[derive(Debug, Clone, Default)]
pub struct TesseractOcr;

impl TesseractOcr {
    pub fn from_config(_config: &OcrConfig) -> Self {
        Self
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, _image: &Path) -> Result<OcrOutput, CollaboratorError> {
        Err(CollaboratorError::rejected(
            "tesseract",
            "OCR support not compiled in (enable the `tesseract` feature)",
        ))
    }
}
