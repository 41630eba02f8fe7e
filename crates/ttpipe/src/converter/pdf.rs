use std::path::Path;
use std::process::Command;

/// Rasterizes page 1 of a PDF to PNG bytes with poppler's `pdftoppm`.
/// The error is a cause string for the caller's conversion error.
pub(crate) fn render_first_page(pdf_path: &Path, dpi: u32) -> Result<Vec<u8>, String> {
    let output_prefix = std::env::temp_dir().join(format!("ttpipe_page_{}", uuid::Uuid::new_v4()));

    let output = Command::new("pdftoppm")
        .args(["-png", "-singlefile", "-f", "1", "-l", "1", "-r"])
        .arg(dpi.to_string())
        .arg(pdf_path)
        .arg(&output_prefix)
        .output()
        .map_err(|e| {
            format!(
                "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                e
            )
        })?;

    if !output.status.success() {
        return Err(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    // -singlefile drops the page-number suffix
    let png_path = output_prefix.with_extension("png");
    let bytes = std::fs::read(&png_path)
        .map_err(|e| format!("pdftoppm produced no page image: {}", e))?;
    let _ = std::fs::remove_file(&png_path);

    Ok(bytes)
}

pub(crate) fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}
