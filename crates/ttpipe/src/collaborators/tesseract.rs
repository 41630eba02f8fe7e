//! Tesseract OCR through leptess.

use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;

use crate::collaborators::ocr::{parse_tsv, OcrEngine};
use crate::collaborators::OcrOutput;
use crate::config::OcrConfig;
use crate::error::CollaboratorError;

const NAME: &str = "tesseract";

#[derive(Debug, Clone)]
pub struct TesseractOcr {
    languages: String,
}

impl TesseractOcr {
    pub fn from_config(config: &OcrConfig) -> Self {
        let languages = if config.languages.is_empty() {
            "eng".to_string()
        } else {
            config.languages.join("+")
        };
        Self { languages }
    }

    fn recognize_blocking(&self, image_path: &Path) -> Result<OcrOutput, CollaboratorError> {
        let _span = tracing::info_span!("collaborator.ocr").entered();

        let image = image::open(image_path)
            .map_err(|e| CollaboratorError::rejected(NAME, format!("cannot decode image: {}", e)))?;
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| CollaboratorError::rejected(NAME, format!("cannot re-encode image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.languages).map_err(|e| {
            CollaboratorError::unavailable(NAME, format!("failed to initialize: {}", e))
        })?;
        lt.set_image_from_mem(&png)
            .map_err(|e| CollaboratorError::rejected(NAME, format!("failed to set image: {}", e)))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| CollaboratorError::unavailable(NAME, format!("recognition failed: {}", e)))?;
        let tsv = lt
            .get_tsv_text(0)
            .map_err(|e| CollaboratorError::unavailable(NAME, format!("recognition failed: {}", e)))?;

        Ok(OcrOutput::from_words(text.trim().to_string(), parse_tsv(&tsv)))
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &Path) -> Result<OcrOutput, CollaboratorError> {
        let this = self.clone();
        let image = image.to_path_buf();
        tokio::task::spawn_blocking(move || this.recognize_blocking(&image))
            .await
            .map_err(|e| CollaboratorError::unavailable(NAME, format!("task aborted: {}", e)))?
    }
}
