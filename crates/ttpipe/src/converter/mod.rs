//! Normalizes arbitrary uploads (JPEG, PNG, GIF, BMP, TIFF, WebP, PDF) into a
//! single JPEG or PNG file the rest of the pipeline can rely on.
//!
//! Alpha is never discarded: an image with transparency is written as PNG
//! even when JPEG was requested. Multi-frame inputs keep only their first
//! frame and PDFs only their first page.

mod pdf;

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::sanitize::redact_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Lossy, no alpha channel.
    Jpeg,
    /// Lossless, keeps alpha.
    Png,
}

impl Encoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Encoding::Jpeg => "jpg",
            Encoding::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Encoding::Jpeg => "image/jpeg",
            Encoding::Png => "image/png",
        }
    }

    /// Guesses the encoding of an already normalized file from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Encoding::Jpeg),
            "png" => Some(Encoding::Png),
            _ => None,
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::Jpeg => write!(f, "jpeg"),
            Encoding::Png => write!(f, "png"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionOutput {
    pub path: PathBuf,
    /// Detected format of the input, e.g. `"png"`, `"tiff"` or `"pdf"`.
    pub original_format: String,
    pub final_encoding: Encoding,
    pub original_size: u64,
    pub converted_size: u64,
}

impl ConversionOutput {
    pub fn size_reduction_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.converted_size as f64 / self.original_size as f64) * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct FeatureConverter {
    jpeg_quality: u8,
    pdf_dpi: u32,
}

impl Default for FeatureConverter {
    fn default() -> Self {
        Self::from_config(&ConversionConfig::default())
    }
}

impl FeatureConverter {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            pdf_dpi: config.pdf_dpi,
        }
    }

    /// Writes `{stem}_converted.{jpg|png}` next to `input`. The input file is
    /// left untouched.
    pub fn convert(
        &self,
        input: &Path,
        preferred: Encoding,
    ) -> Result<ConversionOutput, ConvertError> {
        let _span =
            tracing::info_span!("converter.convert", file = %redact_path(input)).entered();

        let bytes = std::fs::read(input).map_err(|e| ConvertError::ReadInput {
            path: input.to_path_buf(),
            source: e,
        })?;
        let original_format = detect_format(input, &bytes);

        let image = if pdf::is_pdf(&bytes) {
            rasterize_pdf(input, &bytes, self.pdf_dpi)?
        } else {
            decode(input, &bytes, &original_format)?
        };

        let final_encoding = if preferred == Encoding::Jpeg && image.color().has_alpha() {
            debug!(
                "{} has an alpha channel; writing PNG instead of JPEG",
                redact_path(input)
            );
            Encoding::Png
        } else {
            preferred
        };

        let encoded = encode(&image, final_encoding, self.jpeg_quality).map_err(|cause| {
            ConvertError::ConversionFailed {
                format: original_format.clone(),
                cause,
            }
        })?;

        let path = converted_path(input, final_encoding);
        std::fs::write(&path, &encoded).map_err(|e| ConvertError::WriteOutput {
            path: path.clone(),
            cause: e.to_string(),
        })?;

        let output = ConversionOutput {
            path,
            original_format,
            final_encoding,
            original_size: bytes.len() as u64,
            converted_size: encoded.len() as u64,
        };

        info!(
            "Converted {} ({}) to {} ({} -> {} bytes)",
            redact_path(input),
            output.original_format,
            output.final_encoding,
            output.original_size,
            output.converted_size
        );

        Ok(output)
    }
}

/// Renders page 1; when poppler fails, the raw bytes get one decode attempt
/// before the upload is reported as an unconvertible PDF.
fn rasterize_pdf(input: &Path, bytes: &[u8], dpi: u32) -> Result<DynamicImage, ConvertError> {
    let rendered = pdf::render_first_page(input, dpi).and_then(|page| {
        image::load_from_memory_with_format(&page, ImageFormat::Png).map_err(|e| e.to_string())
    });
    match rendered {
        Ok(image) => Ok(image),
        Err(cause) => {
            debug!(
                "Rendering {} failed ({}); retrying from raw bytes",
                redact_path(input),
                cause
            );
            image::load_from_memory(bytes).map_err(|_| ConvertError::ConversionFailed {
                format: "pdf".to_string(),
                cause,
            })
        }
    }
}

/// Decodes by extension first, then by sniffing the bytes. Uploads are often
/// misnamed, so the second pass catches e.g. a PNG saved as `.jpg`.
fn decode(input: &Path, bytes: &[u8], format: &str) -> Result<DynamicImage, ConvertError> {
    match image::open(input) {
        Ok(image) => Ok(image),
        Err(first) => {
            debug!(
                "Decoding {} by extension failed ({}); retrying from raw bytes",
                redact_path(input),
                first
            );
            image::load_from_memory(bytes).map_err(|e| ConvertError::ConversionFailed {
                format: format.to_string(),
                cause: e.to_string(),
            })
        }
    }
}

fn encode(image: &DynamicImage, encoding: Encoding, jpeg_quality: u8) -> Result<Vec<u8>, String> {
    let mut buffer = Cursor::new(Vec::new());
    match encoding {
        Encoding::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buffer, jpeg_quality)
                .encode_image(&rgb)
                .map_err(|e| e.to_string())?;
        }
        Encoding::Png => {
            image
                .write_to(&mut buffer, ImageFormat::Png)
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(buffer.into_inner())
}

fn detect_format(input: &Path, bytes: &[u8]) -> String {
    if pdf::is_pdf(bytes) {
        return "pdf".to_string();
    }
    if let Ok(format) = image::guess_format(bytes) {
        if let Some(ext) = format.extensions_str().first() {
            return match *ext {
                "jpg" => "jpeg".to_string(),
                "tif" => "tiff".to_string(),
                other => other.to_string(),
            };
        }
    }
    input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "unknown".to_string())
}

fn converted_path(input: &Path, encoding: Encoding) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    input.with_file_name(format!("{}_converted.{}", stem, encoding.extension()))
}
