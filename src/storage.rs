//! Workspace layout for persisted request images.
//!
//! Each request gets a short random identifier so concurrent uploads can
//! never collide: originals land in `{data_dir}/uploads`, annotated outputs
//! in `{data_dir}/results`, both keyed by the identifier plus the sanitized
//! original filename.

use std::path::{Path, PathBuf};

pub const UPLOADS_DIR: &str = "uploads";
pub const RESULTS_DIR: &str = "results";

/// Generate a short collision-resistant request identifier (8 hex chars).
pub fn request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Strip path components and hostile characters from an uploaded filename.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .trim_start_matches('.');

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "upload.png".to_string()
    } else {
        cleaned
    }
}

/// Ensure the uploads and results subdirectories exist.
pub fn ensure_workspace(data_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(data_dir.join(UPLOADS_DIR))?;
    std::fs::create_dir_all(data_dir.join(RESULTS_DIR))?;
    Ok(())
}

/// Path for the pre-processing original: `uploads/{id}-{filename}`.
pub fn upload_path(data_dir: &Path, id: &str, filename: &str) -> PathBuf {
    data_dir
        .join(UPLOADS_DIR)
        .join(format!("{id}-{}", sanitize_filename(filename)))
}

/// Filename for the annotated output: `{id}-labeled-{stem}.png`.
///
/// The annotated image is always re-encoded as PNG, whatever the upload was.
pub fn result_name(id: &str, filename: &str) -> String {
    let sanitized = sanitize_filename(filename);
    let stem = sanitized
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&sanitized);
    format!("{id}-labeled-{stem}.png")
}

/// Path for the annotated output under `results/`.
pub fn result_path(data_dir: &Path, result_name: &str) -> PathBuf {
    data_dir.join(RESULTS_DIR).join(result_name)
}
