//! Background submission worker.
//!
//! The network round-trip (upload + follow-up fetch of the annotated image)
//! runs on a spawned task and reports back exclusively through
//! [`ParseEvent`] messages; it never touches interactive state itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ParseError;
use crate::server::ParseResponse;

/// Events emitted by an in-flight submission.
#[derive(Debug)]
pub enum ParseEvent {
    /// Human-readable progress note.
    Progress(String),
    /// Terminal success: the server response plus the locally saved copy of
    /// the annotated image.
    Finished {
        response: ParseResponse,
        annotated_path: PathBuf,
    },
    /// Terminal failure with a displayable message.
    Failed(String),
}

/// Submits screenshots to a running screenlens server.
pub struct ParseWorker {
    client: Client,
    endpoint: String,
    screenshot_dir: PathBuf,
}

impl ParseWorker {
    pub fn new(
        endpoint: impl Into<String>,
        screenshot_dir: PathBuf,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            screenshot_dir,
        })
    }

    /// Spawn the submission as a background task. Exactly one terminal event
    /// (`Finished` or `Failed`) is always delivered.
    pub fn spawn(self: Arc<Self>, file: PathBuf, tx: mpsc::Sender<ParseEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.submit(&file, &tx).await {
                let _ = tx.send(ParseEvent::Failed(e.to_string())).await;
            }
        })
    }

    async fn submit(&self, file: &Path, tx: &mpsc::Sender<ParseEvent>) -> Result<(), ParseError> {
        let _ = tx
            .send(ParseEvent::Progress("uploading screenshot".to_string()))
            .await;

        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| ParseError::Network(format!("cannot read {}: {e}", file.display())))?;
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("screenshot.png")
            .to_string();

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("image/png")
            .map_err(|e| ParseError::Network(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/parse-screenshot", self.endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ParseError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or_else(|| "no error detail".to_string());
            return Err(ParseError::Network(format!(
                "server returned {status}: {message}"
            )));
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| ParseError::Network(format!("malformed response payload: {e}")))?;

        let _ = tx
            .send(ParseEvent::Progress("downloading annotated image".to_string()))
            .await;
        let annotated_path = self.fetch_annotated(&parsed.labeled_image_path).await?;
        debug!(path = %annotated_path.display(), "annotated image saved");

        let _ = tx
            .send(ParseEvent::Finished {
                response: parsed,
                annotated_path,
            })
            .await;
        Ok(())
    }

    /// Fetch the annotated image from the returned location and save it
    /// alongside the screenshots.
    async fn fetch_annotated(&self, labeled_path: &str) -> Result<PathBuf, ParseError> {
        let url = format!("{}/{}", self.endpoint, labeled_path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ParseError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ParseError::Network(format!(
                "annotated image fetch returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ParseError::Network(e.to_string()))?;

        let name = labeled_path.rsplit('/').next().unwrap_or("labeled.png");
        let path = self.screenshot_dir.join(name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ParseError::Network(format!("cannot save annotated image: {e}")))?;

        Ok(path)
    }
}
