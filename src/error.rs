//! Request-level error taxonomy.
//!
//! Adapter implementations have their own error type
//! ([`crate::adapters::AdapterError`]); the orchestrator converts those into
//! `Pipeline` errors with a one-line summary so callers never see adapter
//! internals. The HTTP layer maps each variant to a status code and a
//! `{error, kind}` JSON body.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the parse pipeline and request service.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The uploaded bytes could not be decoded as an image.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A request parameter was outside its validated range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// An adapter failed or returned malformed data during orchestration.
    #[error("pipeline failure: {0}")]
    Pipeline(String),

    /// The source or annotated image could not be written.
    #[error("failed to persist {path}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Client-side transport error or non-success status.
    #[error("network failure: {0}")]
    Network(String),
}

impl ParseError {
    /// Stable taxonomy kind string used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::InvalidImage(_) => "invalid_image",
            ParseError::InvalidOptions(_) => "invalid_options",
            ParseError::Pipeline(_) => "pipeline_failure",
            ParseError::Persistence { .. } => "persistence_failure",
            ParseError::Network(_) => "network_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(ParseError::InvalidImage("x".into()).kind(), "invalid_image");
        assert_eq!(ParseError::Pipeline("x".into()).kind(), "pipeline_failure");
        assert_eq!(
            ParseError::Persistence {
                path: PathBuf::from("/tmp/out.png"),
                source: std::io::Error::other("disk full"),
            }
            .kind(),
            "persistence_failure"
        );
        assert_eq!(ParseError::Network("x".into()).kind(), "network_failure");
    }
}
