//! Pipeline orchestration: OCR, detection + captioning, fusion.

use std::collections::BTreeMap;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::{debug, info, warn};

use super::{
    annotate, ElementKind, ElementRecord, LabelCoordinateMap, ParseOptions, ParsedScreen,
    RenderStyle,
};
use crate::adapters::{Captioner, DetectedBox, IconDetector, OcrAdapter, OcrEngine, OcrSpan};
use crate::error::ParseError;
use crate::geometry::BoundingBox;

/// The screenshot-to-annotation orchestrator.
///
/// Holds shared handles to the capability adapters, which are created once
/// at process start; `parse` itself is stateless per call and safe to invoke
/// from concurrent requests.
pub struct ScreenParser {
    ocr_engines: BTreeMap<OcrEngine, Arc<dyn OcrAdapter>>,
    detector: Arc<dyn IconDetector>,
    captioner: Arc<dyn Captioner>,
    style: RenderStyle,
}

impl std::fmt::Debug for ScreenParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenParser")
            .field("ocr_engines", &self.ocr_engines.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ScreenParser {
    pub fn new(detector: Arc<dyn IconDetector>, captioner: Arc<dyn Captioner>) -> Self {
        Self {
            ocr_engines: BTreeMap::new(),
            detector,
            captioner,
            style: RenderStyle::with_system_font(),
        }
    }

    /// Register an OCR engine selectable via [`ParseOptions::ocr_engine`].
    pub fn with_ocr_engine(mut self, engine: OcrEngine, adapter: Arc<dyn OcrAdapter>) -> Self {
        self.ocr_engines.insert(engine, adapter);
        self
    }

    /// Override the overlay rendering style.
    pub fn with_render_style(mut self, style: RenderStyle) -> Self {
        self.style = style;
        self
    }

    /// Run the full pipeline over one image.
    ///
    /// Returns the annotated image, the geometry-only coordinate map, and
    /// the ordered element list. Element ids are a contiguous 0-based
    /// ordinal with OCR-derived elements strictly before icon-derived ones.
    pub async fn parse(
        &self,
        image: &RgbImage,
        options: &ParseOptions,
    ) -> Result<ParsedScreen, ParseError> {
        options.validate()?;

        let spans = self.run_ocr(image, options).await?;
        debug!(spans = spans.len(), "ocr stage complete");

        let icons = self.detect_icons(image, &spans, options).await?;
        debug!(icons = icons.len(), "detection stage complete");

        let captions = self.caption_icons(image, &icons, options).await?;

        let mut elements = Vec::with_capacity(spans.len() + icons.len());
        for span in spans {
            elements.push(ElementRecord {
                id: elements.len(),
                kind: ElementKind::Text,
                content: span.text,
                interactivity: false,
                bbox: span.bbox,
            });
        }
        for (icon, caption) in icons.into_iter().zip(captions) {
            elements.push(ElementRecord {
                id: elements.len(),
                kind: ElementKind::Icon,
                content: caption,
                interactivity: true,
                bbox: icon.bbox,
            });
        }

        let coordinates: LabelCoordinateMap = elements
            .iter()
            .map(|e| (e.id.to_string(), e.bbox.to_xyxy()))
            .collect();

        let annotated = annotate::render(image, &elements, &self.style);

        info!(elements = elements.len(), "screen parse complete");
        Ok(ParsedScreen {
            annotated,
            coordinates,
            elements,
        })
    }

    async fn run_ocr(
        &self,
        image: &RgbImage,
        options: &ParseOptions,
    ) -> Result<Vec<OcrSpan>, ParseError> {
        let ocr = self.ocr_engines.get(&options.ocr_engine).ok_or_else(|| {
            ParseError::Pipeline(format!(
                "ocr engine '{}' is not configured",
                options.ocr_engine
            ))
        })?;

        match ocr.extract(image, options.text_threshold).await {
            Ok(spans) => {
                let (width, height) = image.dimensions();
                Ok(spans
                    .into_iter()
                    .map(|span| OcrSpan {
                        bbox: span.bbox.clamped(width, height),
                        ..span
                    })
                    .collect())
            }
            Err(e) if options.allow_ocr_failure => {
                warn!(error = %e, "ocr failed, continuing without text elements");
                Ok(Vec::new())
            }
            Err(e) => Err(ParseError::Pipeline(format!(
                "ocr ({}): {e}",
                options.ocr_engine
            ))),
        }
    }

    /// Detect icon candidates on the resized image, rescale their boxes to
    /// source pixels, then apply the confidence cut and duplicate
    /// suppression in original detection order.
    async fn detect_icons(
        &self,
        image: &RgbImage,
        spans: &[OcrSpan],
        options: &ParseOptions,
    ) -> Result<Vec<DetectedBox>, ParseError> {
        let (width, height) = image.dimensions();
        let resized = imageops::resize(
            image,
            options.resize_dim,
            options.resize_dim,
            FilterType::Triangle,
        );

        let candidates = self
            .detector
            .detect(&resized, options.box_threshold, options.iou_threshold)
            .await
            .map_err(|e| ParseError::Pipeline(format!("detector: {e}")))?;

        let sx = width as f32 / options.resize_dim as f32;
        let sy = height as f32 / options.resize_dim as f32;

        let mut kept: Vec<DetectedBox> = Vec::new();
        for candidate in candidates {
            // Confidence exactly at the threshold is kept.
            if candidate.confidence < options.box_threshold {
                continue;
            }
            let bbox = candidate.bbox.scaled(sx, sy).clamped(width, height);

            // A detected box that mostly covers an OCR text region is
            // redundant text, not a separate icon; ditto for a box that
            // duplicates an earlier detection.
            let duplicate = spans
                .iter()
                .map(|s| &s.bbox)
                .chain(kept.iter().map(|k| &k.bbox))
                .any(|other| bbox.iou(other) >= options.iou_threshold);
            if duplicate {
                continue;
            }

            kept.push(DetectedBox {
                bbox,
                confidence: candidate.confidence,
            });
        }

        Ok(kept)
    }

    /// Crop every surviving icon box and caption the crops in batches of at
    /// most `caption_batch_size`, preserving order so captions map back to
    /// boxes by ordinal position.
    async fn caption_icons(
        &self,
        image: &RgbImage,
        icons: &[DetectedBox],
        options: &ParseOptions,
    ) -> Result<Vec<String>, ParseError> {
        if icons.is_empty() {
            return Ok(Vec::new());
        }

        let (width, height) = image.dimensions();
        let crops: Vec<RgbImage> = icons
            .iter()
            .map(|icon| {
                let (x, y, w, h) = icon.bbox.crop_rect(width, height);
                imageops::crop_imm(image, x, y, w, h).to_image()
            })
            .collect();

        let mut captions = Vec::with_capacity(crops.len());
        for batch in crops.chunks(options.caption_batch_size) {
            let batch_captions = self
                .captioner
                .caption(batch)
                .await
                .map_err(|e| ParseError::Pipeline(format!("captioner: {e}")))?;
            captions.extend(batch_captions);
        }

        if captions.len() != crops.len() {
            return Err(ParseError::Pipeline(format!(
                "caption count mismatch: {} captions for {} crops",
                captions.len(),
                crops.len()
            )));
        }

        Ok(captions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticOcr(Vec<OcrSpan>);

    #[async_trait]
    impl OcrAdapter for StaticOcr {
        async fn extract(
            &self,
            _image: &RgbImage,
            _min_confidence: f32,
        ) -> Result<Vec<OcrSpan>, AdapterError> {
            Ok(self.0.clone())
        }
    }

    struct FailingOcr;

    #[async_trait]
    impl OcrAdapter for FailingOcr {
        async fn extract(
            &self,
            _image: &RgbImage,
            _min_confidence: f32,
        ) -> Result<Vec<OcrSpan>, AdapterError> {
            Err(AdapterError::RequestFailed("ocr backend exploded".into()))
        }
    }

    struct StaticDetector(Vec<DetectedBox>);

    #[async_trait]
    impl IconDetector for StaticDetector {
        async fn detect(
            &self,
            _image: &RgbImage,
            _box_threshold: f32,
            _iou_threshold: f32,
        ) -> Result<Vec<DetectedBox>, AdapterError> {
            Ok(self.0.clone())
        }
    }

    /// Captions each crop with its dimensions and records batch sizes.
    struct SizeCaptioner {
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl SizeCaptioner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batch_sizes: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Captioner for SizeCaptioner {
        async fn caption(&self, crops: &[RgbImage]) -> Result<Vec<String>, AdapterError> {
            self.batch_sizes.lock().unwrap().push(crops.len());
            Ok(crops
                .iter()
                .map(|c| format!("{}x{}", c.width(), c.height()))
                .collect())
        }
    }

    fn span(text: &str, bbox: BoundingBox) -> OcrSpan {
        OcrSpan {
            text: text.to_string(),
            bbox,
        }
    }

    fn detection(bbox: BoundingBox, confidence: f32) -> DetectedBox {
        DetectedBox { bbox, confidence }
    }

    /// 64x64 source with resize_dim 64 keeps detector coordinates 1:1 with
    /// source pixels, so tests can reason about boxes directly.
    fn options() -> ParseOptions {
        ParseOptions {
            resize_dim: 64,
            box_threshold: 0.3,
            ..Default::default()
        }
    }

    fn image() -> RgbImage {
        RgbImage::from_pixel(64, 64, image::Rgb([128, 128, 128]))
    }

    fn parser(
        spans: Vec<OcrSpan>,
        detections: Vec<DetectedBox>,
        captioner: Arc<SizeCaptioner>,
    ) -> ScreenParser {
        ScreenParser::new(Arc::new(StaticDetector(detections)), captioner)
            .with_ocr_engine(OcrEngine::Tesseract, Arc::new(StaticOcr(spans)))
            .with_render_style(RenderStyle::default())
    }

    #[tokio::test]
    async fn ids_are_contiguous_with_text_before_icons() {
        let spans = vec![
            span("File", BoundingBox::new(2.0, 2.0, 12.0, 8.0)),
            span("Edit", BoundingBox::new(14.0, 2.0, 24.0, 8.0)),
        ];
        let detections = vec![
            detection(BoundingBox::new(40.0, 40.0, 50.0, 50.0), 0.8),
            detection(BoundingBox::new(2.0, 40.0, 12.0, 50.0), 0.7),
        ];
        let parser = parser(spans, detections, SizeCaptioner::new());

        let parsed = parser.parse(&image(), &options()).await.unwrap();

        assert_eq!(parsed.elements.len(), 4);
        for (i, element) in parsed.elements.iter().enumerate() {
            assert_eq!(element.id, i);
        }
        assert_eq!(parsed.elements[0].kind, ElementKind::Text);
        assert_eq!(parsed.elements[1].kind, ElementKind::Text);
        assert_eq!(parsed.elements[2].kind, ElementKind::Icon);
        assert_eq!(parsed.elements[3].kind, ElementKind::Icon);
        assert!(!parsed.elements[0].interactivity);
        assert!(parsed.elements[2].interactivity);
    }

    #[tokio::test]
    async fn coordinate_map_matches_element_ids() {
        let spans = vec![span("OK", BoundingBox::new(10.0, 10.0, 50.0, 30.0))];
        let detections = vec![detection(BoundingBox::new(2.0, 40.0, 12.0, 50.0), 0.9)];
        let parser = parser(spans, detections, SizeCaptioner::new());

        let parsed = parser.parse(&image(), &options()).await.unwrap();

        assert_eq!(parsed.coordinates.len(), parsed.elements.len());
        for element in &parsed.elements {
            let coords = parsed.coordinates.get(&element.id.to_string()).unwrap();
            assert_eq!(*coords, element.bbox.to_xyxy());
        }
    }

    #[tokio::test]
    async fn confidence_below_threshold_is_dropped_and_equal_is_kept() {
        let detections = vec![
            detection(BoundingBox::new(2.0, 2.0, 12.0, 12.0), 0.02),
            detection(BoundingBox::new(20.0, 20.0, 30.0, 30.0), 0.05),
        ];
        let parser = parser(Vec::new(), detections, SizeCaptioner::new());
        let opts = ParseOptions {
            box_threshold: 0.05,
            resize_dim: 64,
            ..Default::default()
        };

        let parsed = parser.parse(&image(), &opts).await.unwrap();

        assert_eq!(parsed.elements.len(), 1);
        assert_eq!(
            parsed.elements[0].bbox,
            BoundingBox::new(20.0, 20.0, 30.0, 30.0)
        );
    }

    #[tokio::test]
    async fn detected_box_overlapping_ocr_text_is_suppressed() {
        let spans = vec![span("OK", BoundingBox::new(10.0, 10.0, 50.0, 30.0))];
        let detections = vec![
            // Same region as the OCR box: redundant text, not an icon.
            detection(BoundingBox::new(10.0, 10.0, 50.0, 30.0), 0.95),
            detection(BoundingBox::new(2.0, 40.0, 12.0, 50.0), 0.8),
        ];
        let parser = parser(spans, detections, SizeCaptioner::new());

        let parsed = parser.parse(&image(), &options()).await.unwrap();

        assert_eq!(parsed.elements.len(), 2);
        assert_eq!(parsed.elements[0].kind, ElementKind::Text);
        assert_eq!(parsed.elements[0].content, "OK");
        assert_eq!(parsed.elements[1].kind, ElementKind::Icon);
        assert_eq!(
            parsed.elements[1].bbox,
            BoundingBox::new(2.0, 40.0, 12.0, 50.0)
        );
    }

    #[tokio::test]
    async fn duplicate_detections_keep_only_the_first() {
        let b = BoundingBox::new(20.0, 20.0, 40.0, 40.0);
        let detections = vec![detection(b, 0.9), detection(b, 0.8)];
        let parser = parser(Vec::new(), detections, SizeCaptioner::new());

        let parsed = parser.parse(&image(), &options()).await.unwrap();

        assert_eq!(parsed.elements.len(), 1);
    }

    #[tokio::test]
    async fn caption_batches_preserve_order_and_respect_batch_size() {
        // Five icons with distinct crop widths so the caption text reveals
        // which crop it came from.
        let detections: Vec<DetectedBox> = (1..=5)
            .map(|i| {
                let x = (i * 10) as f32;
                detection(BoundingBox::new(x, 5.0, x + i as f32, 10.0), 0.9)
            })
            .collect();
        let captioner = SizeCaptioner::new();
        let parser = parser(Vec::new(), detections, captioner.clone());
        let opts = ParseOptions {
            resize_dim: 64,
            box_threshold: 0.3,
            caption_batch_size: 2,
            ..Default::default()
        };

        let parsed = parser.parse(&image(), &opts).await.unwrap();

        let contents: Vec<&str> = parsed.elements.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["1x5", "2x5", "3x5", "4x5", "5x5"]);

        let batches = captioner.batch_sizes.lock().unwrap().clone();
        assert_eq!(batches, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn detector_boxes_are_rescaled_to_source_pixels() {
        // Source is 128x64 but the detector sees a 64x64 resize, so a box at
        // (16,16)-(32,32) in detector space lands at (32,16)-(64,32).
        let detections = vec![detection(BoundingBox::new(16.0, 16.0, 32.0, 32.0), 0.9)];
        let parser = parser(Vec::new(), detections, SizeCaptioner::new());
        let source = RgbImage::from_pixel(128, 64, image::Rgb([90, 90, 90]));

        let parsed = parser.parse(&source, &options()).await.unwrap();

        assert_eq!(
            parsed.elements[0].bbox,
            BoundingBox::new(32.0, 16.0, 64.0, 32.0)
        );
    }

    #[tokio::test]
    async fn scenario_one_text_and_one_icon() {
        // "OK" at [10,10,50,30] plus one icon at confidence 0.5 with zero
        // OCR overlap, threshold 0.3 -> exactly two elements.
        let spans = vec![span("OK", BoundingBox::new(10.0, 10.0, 50.0, 30.0))];
        let detections = vec![detection(BoundingBox::new(2.0, 45.0, 14.0, 57.0), 0.5)];
        let parser = parser(spans, detections, SizeCaptioner::new());

        let parsed = parser.parse(&image(), &options()).await.unwrap();

        assert_eq!(parsed.elements.len(), 2);
        assert_eq!(parsed.elements[0].id, 0);
        assert_eq!(parsed.elements[0].kind, ElementKind::Text);
        assert_eq!(parsed.elements[0].content, "OK");
        assert_eq!(parsed.elements[1].id, 1);
        assert_eq!(parsed.elements[1].kind, ElementKind::Icon);
        assert!(!parsed.elements[1].content.is_empty());
    }

    #[tokio::test]
    async fn ocr_failure_aborts_by_default() {
        let parser = ScreenParser::new(
            Arc::new(StaticDetector(Vec::new())),
            SizeCaptioner::new(),
        )
        .with_ocr_engine(OcrEngine::Tesseract, Arc::new(FailingOcr))
        .with_render_style(RenderStyle::default());

        let err = parser.parse(&image(), &options()).await.unwrap_err();
        assert!(matches!(err, ParseError::Pipeline(_)));
        assert!(err.to_string().contains("ocr"));
    }

    #[tokio::test]
    async fn degraded_mode_continues_without_text_elements() {
        let detections = vec![detection(BoundingBox::new(5.0, 5.0, 15.0, 15.0), 0.9)];
        let parser = ScreenParser::new(
            Arc::new(StaticDetector(detections)),
            SizeCaptioner::new(),
        )
        .with_ocr_engine(OcrEngine::Tesseract, Arc::new(FailingOcr))
        .with_render_style(RenderStyle::default());
        let opts = ParseOptions {
            allow_ocr_failure: true,
            ..options()
        };

        let parsed = parser.parse(&image(), &opts).await.unwrap();
        assert_eq!(parsed.elements.len(), 1);
        assert_eq!(parsed.elements[0].id, 0);
        assert_eq!(parsed.elements[0].kind, ElementKind::Icon);
    }

    #[tokio::test]
    async fn unconfigured_engine_is_a_pipeline_failure() {
        let parser = ScreenParser::new(
            Arc::new(StaticDetector(Vec::new())),
            SizeCaptioner::new(),
        )
        .with_render_style(RenderStyle::default());

        let err = parser.parse(&image(), &options()).await.unwrap_err();
        assert!(matches!(err, ParseError::Pipeline(_)));
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_before_any_adapter_runs() {
        let parser = parser(Vec::new(), Vec::new(), SizeCaptioner::new());
        let opts = ParseOptions {
            box_threshold: -0.5,
            ..Default::default()
        };

        let err = parser.parse(&image(), &opts).await.unwrap_err();
        assert!(matches!(err, ParseError::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn annotated_image_matches_source_dimensions() {
        let parser = parser(
            vec![span("Go", BoundingBox::new(4.0, 4.0, 20.0, 12.0))],
            Vec::new(),
            SizeCaptioner::new(),
        );
        let parsed = parser.parse(&image(), &options()).await.unwrap();
        assert_eq!(parsed.annotated.dimensions(), (64, 64));
    }
}
