//! HTTP request handlers for the request service.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::adapters::OcrEngine;
use crate::error::ParseError;
use crate::pipeline::{ContentEntry, LabelCoordinateMap, ParseOptions};
use crate::storage;

/// Query parameters of `POST /parse-screenshot`, all optional.
#[derive(Debug, Clone, Deserialize)]
pub struct ParseParams {
    #[serde(default = "default_box_threshold")]
    pub box_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    /// Falls back to the server's configured default engine.
    #[serde(default)]
    pub ocr_engine: Option<OcrEngine>,
    /// Detector input edge, matching the model's trained resolution.
    #[serde(default = "default_imgsz")]
    pub imgsz: u32,
    #[serde(default = "default_batch_size")]
    pub icon_process_batch_size: usize,
}

fn default_box_threshold() -> f32 {
    0.01
}

fn default_iou_threshold() -> f32 {
    0.9
}

fn default_imgsz() -> u32 {
    640
}

fn default_batch_size() -> usize {
    32
}

impl ParseParams {
    fn to_options(&self, default_engine: OcrEngine) -> ParseOptions {
        ParseOptions {
            box_threshold: self.box_threshold,
            iou_threshold: self.iou_threshold,
            ocr_engine: self.ocr_engine.unwrap_or(default_engine),
            resize_dim: self.imgsz,
            caption_batch_size: self.icon_process_batch_size,
            ..Default::default()
        }
    }
}

/// Successful upload response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParseResponse {
    /// Retrieval path for the annotated image, relative to the server root.
    pub labeled_image_path: String,
    pub label_coordinates: LabelCoordinateMap,
    pub parsed_content_list: Vec<ContentEntry>,
}

/// Wrapper turning [`ParseError`] into an `{error, kind}` JSON response.
///
/// Only the summarized message crosses the boundary; sources and backtraces
/// stay server-side.
pub(crate) struct ApiError(ParseError);

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ParseError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            ParseError::InvalidOptions(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ParseError::Pipeline(_) | ParseError::Persistence { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ParseError::Network(_) => StatusCode::BAD_GATEWAY,
        };
        error!(kind = self.0.kind(), error = %self.0, "request failed");
        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        }));
        (status, body).into_response()
    }
}

/// `POST /parse-screenshot`: multipart image upload plus pipeline parameters.
pub async fn parse_screenshot(
    State(state): State<AppState>,
    Query(params): Query<ParseParams>,
    multipart: Multipart,
) -> Result<Json<ParseResponse>, ApiError> {
    let (filename, bytes) = read_upload(multipart).await?;

    let image = image::load_from_memory(&bytes)
        .map_err(|e| ParseError::InvalidImage(e.to_string()))?
        .to_rgb8();

    let id = storage::request_id();
    let data_dir = &state.settings.data_dir;

    // Persist the original before any processing happens.
    let upload_path = storage::upload_path(data_dir, &id, &filename);
    tokio::fs::write(&upload_path, &bytes)
        .await
        .map_err(|source| ParseError::Persistence {
            path: upload_path.clone(),
            source,
        })?;

    let options = params.to_options(state.settings.ocr.default_engine);
    let parsed = state.parser.parse(&image, &options).await?;

    let result_name = storage::result_name(&id, &filename);
    let result_path = storage::result_path(data_dir, &result_name);
    parsed
        .annotated
        .save(&result_path)
        .map_err(|e| ParseError::Persistence {
            path: result_path.clone(),
            source: std::io::Error::other(e),
        })?;

    info!(
        request = %id,
        elements = parsed.elements.len(),
        "screenshot parsed"
    );

    Ok(Json(ParseResponse {
        labeled_image_path: format!("static/{result_name}"),
        label_coordinates: parsed.coordinates,
        parsed_content_list: parsed.elements.iter().map(|e| e.content_entry()).collect(),
    }))
}

/// Pull the `file` field out of the multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), ParseError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ParseError::InvalidImage(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.png").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ParseError::InvalidImage(format!("failed to read upload: {e}")))?;
        return Ok((filename, bytes.to_vec()));
    }

    Err(ParseError::InvalidImage(
        "missing 'file' multipart field".to_string(),
    ))
}

/// `GET /static/{name}`: serve an annotated result image.
pub async fn serve_result(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    // Results are flat files keyed by request id; anything that looks like a
    // path is hostile.
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }

    let file_path = storage::result_path(&state.settings.data_dir, &name);
    let content = match tokio::fs::read(&file_path).await {
        Ok(c) => c,
        Err(_) => return (StatusCode::NOT_FOUND, "not found").into_response(),
    };

    let mime = mime_guess::from_path(&file_path)
        .first_or_octet_stream()
        .to_string();

    ([(header::CONTENT_TYPE, mime)], content).into_response()
}
