//! Error types for slacktap-core.
//!
//! Extraction distinguishes fatal preconditions (unsupported platform,
//! missing app-data directory) from per-store failures, which are absorbed
//! into partial results and never surface here. API failures always carry
//! the remote-supplied error code so callers can branch on it.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by credential extraction and the API client.
#[derive(Debug, Error)]
pub enum Error {
    /// Platform identifier the extractor has no store path for.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The desktop client's application-data directory does not exist.
    #[error("Slack app data directory not found: {}", .0.display())]
    SourceDirectoryNotFound(PathBuf),

    /// Extraction finished without finding a single token. Non-fatal at the
    /// extraction layer (an empty result is returned); callers raise this
    /// when an empty result is unacceptable.
    #[error("no Slack tokens found in the desktop client storage")]
    ExtractionEmpty,

    /// The remote API signaled failure, or transport failed. `code` is the
    /// remote error code when one was given, a stable local code otherwise;
    /// the transport source is preserved when there is one.
    #[error("Slack API error: {code}")]
    Api {
        code: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Client constructed without a required credential.
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Remote error code, if this is an API failure.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Error::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
