//! Screenshot-to-annotation pipeline.
//!
//! [`ScreenParser`] sequences the capability adapters (OCR, detection,
//! captioning), fuses their outputs into one coordinate-indexed element
//! list, and delegates overlay rendering to [`annotate`]. One call, one
//! result; no state survives across requests.

pub mod annotate;
mod orchestrator;

pub use annotate::{render, RenderStyle};
pub use orchestrator::ScreenParser;

use std::collections::BTreeMap;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::adapters::OcrEngine;
use crate::error::ParseError;
use crate::geometry::BoundingBox;

/// Mapping from element id (decimal string) to its box in source pixels.
pub type LabelCoordinateMap = BTreeMap<String, [f32; 4]>;

/// Kind of a finalized element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Icon,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Text => write!(f, "text"),
            ElementKind::Icon => write!(f, "icon"),
        }
    }
}

/// A finalized, user-facing UI element.
///
/// Ids are a contiguous 0-based ordinal over the concatenation of OCR
/// elements followed by icon elements, each in original detection order.
/// Downstream consumers rely on that ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    pub id: usize,
    pub kind: ElementKind,
    pub content: String,
    pub interactivity: bool,
    pub bbox: BoundingBox,
}

/// The wire representation of an element in `parsed_content_list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub content: String,
    pub interactivity: bool,
}

impl ElementRecord {
    /// Project the record down to its wire form (geometry travels separately
    /// in the coordinate map).
    pub fn content_entry(&self) -> ContentEntry {
        ContentEntry {
            kind: self.kind,
            content: self.content.clone(),
            interactivity: self.interactivity,
        }
    }
}

/// Per-request pipeline configuration.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Minimum detector confidence to keep a candidate (inclusive).
    pub box_threshold: f32,
    /// Overlap at or above which a detected box is suppressed as a
    /// duplicate of an OCR box or an earlier detection.
    pub iou_threshold: f32,
    /// Which configured OCR engine to use.
    pub ocr_engine: OcrEngine,
    /// Square edge the image is resized to before detection, matching the
    /// detector's trained resolution.
    pub resize_dim: u32,
    /// Maximum number of crops per captioning call.
    pub caption_batch_size: usize,
    /// Minimum OCR word confidence (inclusive).
    pub text_threshold: f32,
    /// Degraded mode: continue with zero text elements when OCR fails.
    /// Off by default; the pipeline is fail-fast.
    pub allow_ocr_failure: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            box_threshold: 0.01,
            iou_threshold: 0.9,
            ocr_engine: OcrEngine::default(),
            resize_dim: 640,
            caption_batch_size: 32,
            text_threshold: 0.9,
            allow_ocr_failure: false,
        }
    }
}

impl ParseOptions {
    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<(), ParseError> {
        fn unit_interval(name: &str, value: f32) -> Result<(), ParseError> {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(ParseError::InvalidOptions(format!(
                    "{name} must be in (0, 1], got {value}"
                )))
            }
        }

        unit_interval("box_threshold", self.box_threshold)?;
        unit_interval("iou_threshold", self.iou_threshold)?;
        unit_interval("text_threshold", self.text_threshold)?;
        if self.resize_dim == 0 {
            return Err(ParseError::InvalidOptions(
                "resize_dim must be positive".to_string(),
            ));
        }
        if self.caption_batch_size == 0 {
            return Err(ParseError::InvalidOptions(
                "caption_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// The product of one pipeline run.
#[derive(Debug)]
pub struct ParsedScreen {
    /// Copy of the source image with boxes and labels drawn.
    pub annotated: RgbImage,
    /// Geometry-only view keyed by element id.
    pub coordinates: LabelCoordinateMap,
    /// Ordered element list (OCR first, then icons).
    pub elements: Vec<ElementRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(ParseOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let options = ParseOptions {
            box_threshold: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ParseError::InvalidOptions(_))
        ));
    }

    #[test]
    fn threshold_above_one_is_rejected() {
        let options = ParseOptions {
            iou_threshold: 1.5,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn threshold_of_exactly_one_is_accepted() {
        let options = ParseOptions {
            iou_threshold: 1.0,
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let no_resize = ParseOptions {
            resize_dim: 0,
            ..Default::default()
        };
        assert!(no_resize.validate().is_err());

        let no_batch = ParseOptions {
            caption_batch_size: 0,
            ..Default::default()
        };
        assert!(no_batch.validate().is_err());
    }

    #[test]
    fn content_entry_serializes_with_type_field() {
        let record = ElementRecord {
            id: 3,
            kind: ElementKind::Icon,
            content: "settings gear".to_string(),
            interactivity: true,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        };
        let json = serde_json::to_value(record.content_entry()).unwrap();
        assert_eq!(json["type"], "icon");
        assert_eq!(json["content"], "settings gear");
        assert_eq!(json["interactivity"], true);
    }
}
