use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::ImageFormat;

use crate::config::OcrConfig;
use crate::error::CollaboratorError;

const NAME: &str = "preprocessor";

/// Prepares an image for OCR and returns the path of the prepared copy.
#[async_trait]
pub trait ImagePreprocessor: Send + Sync {
    async fn preprocess(&self, input: &Path) -> Result<PathBuf, CollaboratorError>;
}

/// Grayscale plus a contrast boost, written as `preprocessed_<uuid>.png`
/// next to the input.
#[derive(Debug, Clone)]
pub struct ContrastPreprocessor {
    contrast: f32,
}

impl ContrastPreprocessor {
    pub fn new(contrast: f32) -> Self {
        Self { contrast }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(config.contrast)
    }

    fn preprocess_blocking(&self, input: &Path) -> Result<PathBuf, CollaboratorError> {
        let _span = tracing::info_span!("collaborator.preprocess").entered();

        let image = image::open(input)
            .map_err(|e| CollaboratorError::rejected(NAME, format!("cannot decode input: {}", e)))?;
        let prepared = image.grayscale().adjust_contrast(self.contrast);

        let path = input.with_file_name(format!("preprocessed_{}.png", uuid::Uuid::new_v4()));
        prepared
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| CollaboratorError::unavailable(NAME, format!("write failed: {}", e)))?;
        Ok(path)
    }
}

#[async_trait]
impl ImagePreprocessor for ContrastPreprocessor {
    async fn preprocess(&self, input: &Path) -> Result<PathBuf, CollaboratorError> {
        let this = self.clone();
        let input = input.to_path_buf();
        tokio::task::spawn_blocking(move || this.preprocess_blocking(&input))
            .await
            .map_err(|e| CollaboratorError::unavailable(NAME, format!("task aborted: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_output_is_grayscale_png() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("scan.png");
        RgbImage::from_pixel(20, 20, Rgb([200, 30, 30])).save(&input).unwrap();

        let out = ContrastPreprocessor::new(20.0).preprocess(&input).await.unwrap();

        let name = out.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("preprocessed_"));
        assert!(name.ends_with(".png"));
        let decoded = image::open(&out).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
    }
}
