//! Screen capture via an external grabber binary.
//!
//! Capture mechanics are deliberately thin: we shell out to whatever
//! screenshot tool the desktop provides and only verify that the file
//! actually landed on disk before anything gets submitted.

use std::path::Path;

use anyhow::{bail, Context};
use tokio::process::Command;
use tracing::debug;

/// Capture tools probed in order when no override is configured.
const CAPTURE_CANDIDATES: &[&str] = &["grim", "spectacle", "gnome-screenshot", "scrot"];

/// A resolved screen-capture command.
pub struct ScreenCapture {
    command: String,
}

impl ScreenCapture {
    /// Resolve the capture binary: an explicit override, or the first
    /// candidate found on PATH.
    pub fn detect(command_override: Option<&str>) -> anyhow::Result<Self> {
        if let Some(cmd) = command_override {
            which::which(cmd).with_context(|| format!("capture command '{cmd}' not found"))?;
            return Ok(Self {
                command: cmd.to_string(),
            });
        }

        for candidate in CAPTURE_CANDIDATES {
            if which::which(candidate).is_ok() {
                debug!(command = candidate, "capture tool detected");
                return Ok(Self {
                    command: candidate.to_string(),
                });
            }
        }

        bail!(
            "no screen capture tool found (tried {})",
            CAPTURE_CANDIDATES.join(", ")
        )
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Capture the screen to `path` and confirm the file was written.
    pub async fn capture(&self, path: &Path) -> anyhow::Result<()> {
        let args = capture_args(&self.command, path);

        let output = Command::new(&self.command)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} failed: {}", self.command, stderr.trim());
        }

        // Submission must not start until the capture is confirmed on disk.
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("capture did not produce {}", path.display()))?;
        if metadata.len() == 0 {
            bail!("capture produced an empty file at {}", path.display());
        }

        Ok(())
    }
}

/// Per-tool argument shape; every candidate takes an output path but spells
/// it differently.
fn capture_args(command: &str, path: &Path) -> Vec<String> {
    let path = path.display().to_string();
    match command {
        "gnome-screenshot" => vec!["-f".to_string(), path],
        "spectacle" => vec!["-b".to_string(), "-n".to_string(), "-o".to_string(), path],
        _ => vec![path],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn grabber_argument_shapes() {
        let path = PathBuf::from("/tmp/shot.png");
        assert_eq!(capture_args("grim", &path), vec!["/tmp/shot.png"]);
        assert_eq!(capture_args("scrot", &path), vec!["/tmp/shot.png"]);
        assert_eq!(
            capture_args("gnome-screenshot", &path),
            vec!["-f", "/tmp/shot.png"]
        );
        assert_eq!(
            capture_args("spectacle", &path),
            vec!["-b", "-n", "-o", "/tmp/shot.png"]
        );
    }

    #[test]
    fn unknown_override_is_rejected() {
        let result = ScreenCapture::detect(Some("definitely-not-a-real-grabber-9000"));
        assert!(result.is_err());
    }
}
