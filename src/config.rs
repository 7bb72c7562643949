//! Configuration management for screenlens.
//!
//! Settings come from an optional TOML file (default location under the user
//! config directory) with serde defaults for every field, so a missing file
//! just means "all defaults". The data directory can be overridden from the
//! CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::OcrEngine;

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Workspace for uploads and annotated results.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub detector: EndpointConfig,

    #[serde(default)]
    pub captioner: EndpointConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

/// HTTP server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// A remote capability endpoint plus its request timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Engine used when a request does not pick one.
    #[serde(default)]
    pub default_engine: OcrEngine,
    /// Tesseract language pack.
    #[serde(default = "default_language")]
    pub language: String,
    /// Optional remote OCR endpoint enabling the `remote` engine.
    #[serde(default)]
    pub remote_endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Capture client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of a running screenlens server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Where screenshots and downloaded annotations are stored.
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
    /// Override for the external capture binary; auto-detected when unset.
    #[serde(default)]
    pub capture_command: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("screenlens")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_screenshot_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("screenshots")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            default_engine: OcrEngine::default(),
            language: default_language(),
            remote_endpoint: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            screenshot_dir: default_screenshot_dir(),
            capture_command: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Default config file path: `{config_dir}/screenlens/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("screenlens").join("config.toml"))
}

/// Load settings from an explicit path, the default location, or defaults.
pub fn load_settings(
    config_path: Option<&Path>,
    data_dir_override: Option<PathBuf>,
) -> anyhow::Result<Settings> {
    let path = config_path
        .map(Path::to_path_buf)
        .or_else(default_config_path);

    let mut settings = match path {
        Some(ref p) if p.exists() => {
            let raw = std::fs::read_to_string(p)?;
            toml::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", p.display()))?
        }
        _ => Settings {
            data_dir: default_data_dir(),
            ..Default::default()
        },
    };

    if settings.data_dir.as_os_str().is_empty() {
        settings.data_dir = default_data_dir();
    }
    if let Some(dir) = data_dir_override {
        settings.data_dir = dir;
    }

    Ok(settings)
}
