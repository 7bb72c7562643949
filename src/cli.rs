//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use console::style;

use crate::adapters::{
    OcrAdapter, OcrEngine, RemoteCaptioner, RemoteDetector, RemoteOcr, TesseractOcr,
};
use crate::config::{load_settings, Settings};
use crate::pipeline::ScreenParser;
use crate::{client, server};

#[derive(Parser)]
#[command(name = "screenlens")]
#[command(about = "Screenshot parsing service and capture client")]
#[command(version)]
pub struct Cli {
    /// Data directory for uploads and annotated results
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file path (default: user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP request service
    Serve {
        /// Bind address override
        #[arg(long)]
        host: Option<String>,
        /// Port override
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Interactive capture loop: screenshot, submit, display
    Capture,

    /// Submit a single existing image and print the parsed elements
    Parse {
        /// Image file to submit
        file: PathBuf,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref(), cli.data_dir)?;

    match cli.command {
        Commands::Serve { host, port } => serve(settings, host, port).await,
        Commands::Capture => client::run(&settings.client).await,
        Commands::Parse { file } => client::submit_once(&settings.client, file).await,
    }
}

async fn serve(mut settings: Settings, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let parser = Arc::new(build_parser(&settings)?);

    println!(
        "{} http://{}:{}",
        style("screenlens listening on").green().bold(),
        settings.server.host,
        settings.server.port
    );

    server::serve(parser, settings).await
}

/// Wire the capability adapters into one shared parser.
///
/// The detector and captioner endpoints are mandatory for serving; OCR always
/// has the local tesseract engine, plus the remote engine when an endpoint is
/// configured.
pub fn build_parser(settings: &Settings) -> anyhow::Result<ScreenParser> {
    if !settings.detector.is_configured() {
        bail!("no detector endpoint configured (set [detector] endpoint in the config file)");
    }
    if !settings.captioner.is_configured() {
        bail!("no captioner endpoint configured (set [captioner] endpoint in the config file)");
    }

    let detector = Arc::new(RemoteDetector::new(
        settings.detector.endpoint.clone(),
        settings.detector.timeout(),
    )?);
    let captioner = Arc::new(RemoteCaptioner::new(
        settings.captioner.endpoint.clone(),
        settings.captioner.timeout(),
    )?);

    let mut parser = ScreenParser::new(detector, captioner).with_ocr_engine(
        OcrEngine::Tesseract,
        Arc::new(TesseractOcr::new(settings.ocr.language.clone())) as Arc<dyn OcrAdapter>,
    );

    if let Some(ref endpoint) = settings.ocr.remote_endpoint {
        parser = parser.with_ocr_engine(
            OcrEngine::Remote,
            Arc::new(RemoteOcr::new(endpoint.clone(), settings.ocr.timeout())?)
                as Arc<dyn OcrAdapter>,
        );
    }

    Ok(parser)
}
