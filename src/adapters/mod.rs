//! Opaque analysis capabilities consumed by the pipeline.
//!
//! The pipeline never implements OCR, detection, or captioning itself; it
//! composes three capability traits with fixed input/output contracts:
//!
//! - [`OcrAdapter`]: image -> recognized text spans with boxes
//! - [`IconDetector`]: image -> candidate icon boxes with confidences
//! - [`Captioner`]: batch of cropped regions -> one label per region
//!
//! Swapping implementations (e.g. a different OCR engine) is a configuration
//! choice, not a code change. The shipped implementations are the local
//! Tesseract binary ([`TesseractOcr`]) and JSON-over-HTTP endpoints for
//! everything else ([`RemoteOcr`], [`RemoteDetector`], [`RemoteCaptioner`]).

mod remote;
mod tesseract;

pub use remote::{RemoteCaptioner, RemoteDetector, RemoteOcr};
pub use tesseract::TesseractOcr;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::BoundingBox;

/// Errors produced by capability adapters.
///
/// These never cross the orchestrator boundary; they are summarized into
/// [`crate::error::ParseError::Pipeline`] there.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The backing binary or endpoint is not usable at all.
    #[error("backend not available: {0}")]
    BackendNotAvailable(String),

    /// The adapter ran but failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The adapter responded with data that violates its contract.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// An image could not be encoded or decoded for transport.
    #[error("image handling: {0}")]
    Image(String),

    #[error("io")]
    Io(#[from] std::io::Error),
}

/// Selectable OCR engine, chosen per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngine {
    /// Local Tesseract binary (default).
    Tesseract,
    /// Remote OCR capability endpoint.
    Remote,
}

impl Default for OcrEngine {
    fn default() -> Self {
        OcrEngine::Tesseract
    }
}

impl fmt::Display for OcrEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrEngine::Tesseract => write!(f, "tesseract"),
            OcrEngine::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for OcrEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tesseract" => Ok(OcrEngine::Tesseract),
            "remote" => Ok(OcrEngine::Remote),
            other => Err(format!("unknown ocr engine '{other}'")),
        }
    }
}

/// A recognized text fragment with its location in source pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrSpan {
    pub text: String,
    pub bbox: BoundingBox,
}

/// A detected icon candidate, in the coordinate space of the image the
/// detector was given.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedBox {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Text extraction over a full image.
#[async_trait]
pub trait OcrAdapter: Send + Sync {
    /// Recognize text in `image`, dropping words below `min_confidence`
    /// (range 0..=1). Boxes are in pixels of the given image.
    async fn extract(
        &self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Vec<OcrSpan>, AdapterError>;
}

/// Icon-like element detection over a (typically resized) image.
#[async_trait]
pub trait IconDetector: Send + Sync {
    /// Detect candidate boxes. `box_threshold` and `iou_threshold` are
    /// forwarded so the backing model can apply its own confidence cut and
    /// NMS; the orchestrator re-applies both regardless.
    async fn detect(
        &self,
        image: &RgbImage,
        box_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<DetectedBox>, AdapterError>;
}

/// Captioning of cropped regions, one batch per call.
#[async_trait]
pub trait Captioner: Send + Sync {
    /// Produce exactly one caption per crop, in input order.
    async fn caption(&self, crops: &[RgbImage]) -> Result<Vec<String>, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_engine_parses_known_names() {
        assert_eq!("tesseract".parse::<OcrEngine>(), Ok(OcrEngine::Tesseract));
        assert_eq!("Remote".parse::<OcrEngine>(), Ok(OcrEngine::Remote));
        assert!("easyocr".parse::<OcrEngine>().is_err());
    }

    #[test]
    fn ocr_engine_display_round_trips() {
        for engine in [OcrEngine::Tesseract, OcrEngine::Remote] {
            assert_eq!(engine.to_string().parse::<OcrEngine>(), Ok(engine));
        }
    }
}
