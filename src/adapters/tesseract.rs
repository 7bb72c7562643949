//! Tesseract OCR adapter.
//!
//! Uses the system `tesseract` binary in TSV mode, which reports a bounding
//! box and confidence per recognized word. This is the default engine: no
//! model weights to manage and it is widely packaged.

use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;
use tokio::process::Command;
use tracing::debug;

use super::{AdapterError, OcrAdapter, OcrSpan};
use crate::geometry::BoundingBox;

/// OCR adapter backed by the command-line Tesseract binary.
pub struct TesseractOcr {
    language: String,
}

impl TesseractOcr {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    /// Whether the `tesseract` binary can be found on PATH.
    pub fn is_available() -> bool {
        which::which("tesseract").is_ok()
    }

    async fn run_tesseract(&self, image_path: &Path) -> Result<String, AdapterError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .arg("tsv")
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(AdapterError::RequestFailed(format!(
                    "tesseract failed: {}",
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AdapterError::BackendNotAvailable(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => Err(AdapterError::Io(e)),
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("eng")
    }
}

#[async_trait]
impl OcrAdapter for TesseractOcr {
    async fn extract(
        &self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Vec<OcrSpan>, AdapterError> {
        // Tesseract reads from disk, so stage the image in a scratch file.
        let scratch = tempfile::Builder::new()
            .prefix("screenlens-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save(scratch.path())
            .map_err(|e| AdapterError::Image(format!("failed to stage image for ocr: {e}")))?;

        let tsv = self.run_tesseract(scratch.path()).await?;
        let spans = parse_tsv(&tsv, min_confidence);
        debug!(words = spans.len(), "tesseract ocr complete");
        Ok(spans)
    }
}

/// Parse Tesseract TSV output into word-level spans.
///
/// TSV columns: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Word rows have level 5 and a
/// confidence in 0..=100; everything else carries conf -1 and is skipped.
fn parse_tsv(tsv: &str, min_confidence: f32) -> Vec<OcrSpan> {
    let min_conf_pct = min_confidence * 100.0;
    let mut spans = Vec::new();

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        if fields[0] != "5" {
            continue;
        }
        let (Ok(left), Ok(top), Ok(width), Ok(height), Ok(conf)) = (
            fields[6].parse::<f32>(),
            fields[7].parse::<f32>(),
            fields[8].parse::<f32>(),
            fields[9].parse::<f32>(),
            fields[10].parse::<f32>(),
        ) else {
            continue;
        };
        if conf < min_conf_pct {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }
        spans.push(OcrSpan {
            text: text.to_string(),
            bbox: BoundingBox::new(left, top, left + width, top + height),
        });
    }

    spans
}
