use std::path::Path;

use async_trait::async_trait;

use crate::collaborators::{OcrOutput, OcrWord};
use crate::error::CollaboratorError;

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognizes text in `image`, with a mean confidence in `0.0..=1.0`.
    async fn recognize(&self, image: &Path) -> Result<OcrOutput, CollaboratorError>;
}

/// Parses Tesseract TSV output into words.
///
/// Only word rows (level 5) with a positive confidence and non-blank text
/// are kept. Confidences are rescaled from 0..100 to 0..1.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let confidence: f64 = cols[10].trim().parse().ok()?;
            let text = cols[11].trim();
            if !confidence.is_finite() || confidence <= 0.0 || text.is_empty() {
                return None;
            }
            Some(OcrWord {
                text: text.to_string(),
                confidence: (confidence / 100.0).min(1.0),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t300\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t80\t20\t96.5\tMonday
5\t1\t1\t1\t1\t2\t100\t10\t80\t20\t83.5\tMaths
5\t1\t1\t1\t1\t3\t190\t10\t10\t20\t0\t|
5\t1\t1\t1\t1\t4\t210\t10\t10\t20\t55\t   
";

    #[test]
    fn test_parse_tsv_keeps_confident_words() {
        let words = parse_tsv(SAMPLE);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "Monday");
        assert!((words[0].confidence - 0.965).abs() < 1e-9);
        assert_eq!(words[1].text, "Maths");
    }

    #[test]
    fn test_parse_tsv_mean_confidence() {
        let out = OcrOutput::from_words("Monday Maths".to_string(), parse_tsv(SAMPLE));
        assert!((out.confidence - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_garbage() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv("5\tnot\tenough").is_empty());
        assert!(parse_tsv("5\t1\t1\t1\t1\t1\t0\t0\t0\t0\tNaNx\tword").is_empty());
    }
}
