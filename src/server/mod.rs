//! HTTP request service.
//!
//! Accepts screenshot uploads, runs the parse pipeline, persists the source
//! and annotated images under a per-request identifier, and serves the
//! annotated output back as a static file.

mod handlers;
mod routes;

pub use handlers::{ParseParams, ParseResponse};
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::pipeline::ScreenParser;

/// Shared state for the request service.
///
/// The parser (and the adapter handles inside it) is built once at startup
/// and shared read-only across concurrent requests; the only other shared
/// resource is the workspace directory, which is collision-safe via
/// per-request identifiers.
#[derive(Clone)]
pub struct AppState {
    pub parser: Arc<ScreenParser>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(parser: Arc<ScreenParser>, settings: Settings) -> Self {
        Self {
            parser,
            settings: Arc::new(settings),
        }
    }
}

/// Start the request service.
pub async fn serve(parser: Arc<ScreenParser>, settings: Settings) -> anyhow::Result<()> {
    crate::storage::ensure_workspace(&settings.data_dir)?;

    let addr: SocketAddr =
        format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let state = AppState::new(parser, settings);
    let app = create_router(state);

    tracing::info!("starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
