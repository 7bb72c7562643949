//! JSON-over-HTTP capability endpoints.
//!
//! The detection and captioning models (and optionally OCR) run out of
//! process behind plain JSON endpoints; images travel as base64-encoded PNG.
//! Each client owns a reqwest `Client` with a bounded timeout and makes a
//! single attempt per call - failures are summarized upstream, never
//! retried.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AdapterError, Captioner, DetectedBox, IconDetector, OcrAdapter, OcrSpan};
use crate::geometry::BoundingBox;

fn build_client(timeout: Duration) -> Result<Client, AdapterError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AdapterError::BackendNotAvailable(format!("http client: {e}")))
}

/// Encode an image as a base64 PNG payload.
fn encode_png_base64(image: &RgbImage) -> Result<String, AdapterError> {
    let mut buf = Vec::new();
    PngEncoder::new(Cursor::new(&mut buf))
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| AdapterError::Image(format!("png encode: {e}")))?;
    Ok(BASE64.encode(&buf))
}

async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
    client: &Client,
    endpoint: &str,
    request: &Req,
) -> Result<Resp, AdapterError> {
    let response = client
        .post(endpoint)
        .json(request)
        .send()
        .await
        .map_err(|e| AdapterError::RequestFailed(format!("{endpoint}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AdapterError::RequestFailed(format!(
            "{endpoint}: HTTP {status}"
        )));
    }

    response
        .json::<Resp>()
        .await
        .map_err(|e| AdapterError::MalformedResponse(e.to_string()))
}

/// OCR over a remote capability endpoint.
pub struct RemoteOcr {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct OcrRequest<'a> {
    image: &'a str,
    text_threshold: f32,
}

/// Parallel lists: `texts[i]` was recognized inside `boxes[i]`.
#[derive(Deserialize)]
struct OcrResponse {
    texts: Vec<String>,
    boxes: Vec<[f32; 4]>,
}

impl RemoteOcr {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl OcrAdapter for RemoteOcr {
    async fn extract(
        &self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Vec<OcrSpan>, AdapterError> {
        let request = OcrRequest {
            image: &encode_png_base64(image)?,
            text_threshold: min_confidence,
        };
        let response: OcrResponse = post_json(&self.client, &self.endpoint, &request).await?;

        if response.texts.len() != response.boxes.len() {
            return Err(AdapterError::MalformedResponse(format!(
                "ocr endpoint returned {} texts but {} boxes",
                response.texts.len(),
                response.boxes.len()
            )));
        }

        debug!(spans = response.texts.len(), "remote ocr complete");
        Ok(response
            .texts
            .into_iter()
            .zip(response.boxes)
            .map(|(text, coords)| OcrSpan {
                text,
                bbox: BoundingBox::from_xyxy(coords),
            })
            .collect())
    }
}

/// Icon detection over a remote capability endpoint.
pub struct RemoteDetector {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    image: &'a str,
    box_threshold: f32,
    iou_threshold: f32,
}

/// Parallel lists: `scores[i]` is the confidence of `boxes[i]`.
#[derive(Deserialize)]
struct DetectResponse {
    boxes: Vec<[f32; 4]>,
    scores: Vec<f32>,
}

impl RemoteDetector {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl IconDetector for RemoteDetector {
    async fn detect(
        &self,
        image: &RgbImage,
        box_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<DetectedBox>, AdapterError> {
        let request = DetectRequest {
            image: &encode_png_base64(image)?,
            box_threshold,
            iou_threshold,
        };
        let response: DetectResponse = post_json(&self.client, &self.endpoint, &request).await?;

        if response.boxes.len() != response.scores.len() {
            return Err(AdapterError::MalformedResponse(format!(
                "detector returned {} boxes but {} scores",
                response.boxes.len(),
                response.scores.len()
            )));
        }

        debug!(candidates = response.boxes.len(), "remote detection complete");
        Ok(response
            .boxes
            .into_iter()
            .zip(response.scores)
            .map(|(coords, confidence)| DetectedBox {
                bbox: BoundingBox::from_xyxy(coords),
                confidence,
            })
            .collect())
    }
}

/// Region captioning over a remote capability endpoint.
pub struct RemoteCaptioner {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct CaptionRequest {
    crops: Vec<String>,
}

#[derive(Deserialize)]
struct CaptionResponse {
    captions: Vec<String>,
}

impl RemoteCaptioner {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Captioner for RemoteCaptioner {
    async fn caption(&self, crops: &[RgbImage]) -> Result<Vec<String>, AdapterError> {
        let request = CaptionRequest {
            crops: crops
                .iter()
                .map(encode_png_base64)
                .collect::<Result<Vec<_>, _>>()?,
        };
        let response: CaptionResponse = post_json(&self.client, &self.endpoint, &request).await?;

        if response.captions.len() != crops.len() {
            return Err(AdapterError::MalformedResponse(format!(
                "captioner returned {} captions for {} crops",
                response.captions.len(),
                crops.len()
            )));
        }

        debug!(captions = response.captions.len(), "caption batch complete");
        Ok(response.captions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_payload_is_valid_base64_of_a_png() {
        let image = RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let payload = encode_png_base64(&image).unwrap();
        let bytes = BASE64.decode(payload).unwrap();
        // PNG magic
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 4));
        assert_eq!(decoded.get_pixel(0, 0), &image::Rgb([10, 20, 30]));
    }
}
