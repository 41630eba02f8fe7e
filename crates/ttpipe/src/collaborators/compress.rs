use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageFormat;

use crate::collaborators::CompressionOutput;
use crate::config::CompressionConfig;
use crate::converter::Encoding;
use crate::error::CollaboratorError;

const NAME: &str = "compressor";

#[async_trait]
pub trait ImageCompressor: Send + Sync {
    async fn compress(
        &self,
        input: &Path,
        encoding: Encoding,
    ) -> Result<CompressionOutput, CollaboratorError>;
}

/// Downscales so the longest edge fits `max_dimension`, then re-encodes.
#[derive(Debug, Clone)]
pub struct ResizingCompressor {
    max_dimension: u32,
    jpeg_quality: u8,
}

impl ResizingCompressor {
    pub fn from_config(config: &CompressionConfig) -> Self {
        Self {
            max_dimension: config.max_dimension.max(1),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }

    fn compress_blocking(
        &self,
        input: &Path,
        encoding: Encoding,
    ) -> Result<CompressionOutput, CollaboratorError> {
        let _span = tracing::info_span!("collaborator.compress").entered();

        let original_size = std::fs::metadata(input)
            .map_err(|e| CollaboratorError::rejected(NAME, format!("cannot stat input: {}", e)))?
            .len();
        let mut image = image::open(input)
            .map_err(|e| CollaboratorError::rejected(NAME, format!("cannot decode input: {}", e)))?;

        if image.width().max(image.height()) > self.max_dimension {
            image = image.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3);
        }

        let mut buffer = Cursor::new(Vec::new());
        let encoded = match encoding {
            Encoding::Jpeg => JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality)
                .encode_image(&image.to_rgb8()),
            Encoding::Png => image.write_to(&mut buffer, ImageFormat::Png),
        };
        encoded.map_err(|e| CollaboratorError::rejected(NAME, format!("encode failed: {}", e)))?;
        let bytes = buffer.into_inner();

        let path = compressed_path(input, encoding);
        std::fs::write(&path, &bytes)
            .map_err(|e| CollaboratorError::unavailable(NAME, format!("write failed: {}", e)))?;

        Ok(CompressionOutput {
            path,
            original_size,
            compressed_size: bytes.len() as u64,
        })
    }
}

#[async_trait]
impl ImageCompressor for ResizingCompressor {
    async fn compress(
        &self,
        input: &Path,
        encoding: Encoding,
    ) -> Result<CompressionOutput, CollaboratorError> {
        let this = self.clone();
        let input = input.to_path_buf();
        tokio::task::spawn_blocking(move || this.compress_blocking(&input, encoding))
            .await
            .map_err(|e| CollaboratorError::unavailable(NAME, format!("task aborted: {}", e)))?
    }
}

fn compressed_path(input: &Path, encoding: Encoding) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    input.with_file_name(format!("{}_compressed.{}", stem, encoding.extension()))
}
