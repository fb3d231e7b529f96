use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the `haier-api` crate.
///
/// Covers every failure mode across the API surface: authentication,
/// HTTP transport, the `retCode` envelope, the live channel, and local
/// credential storage. `haier-core` maps these into user-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed (missing credentials, rejected password, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Application envelope ────────────────────────────────────────
    /// The cloud answered with a non-success `retCode`.
    #[error("API error [{code}]: {message}")]
    Api { code: String, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An operation did not complete within its deadline.
    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Live channel ────────────────────────────────────────────────
    /// WebSocket connection failed or a frame could not be written.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// A send was attempted while the live channel is not open.
    #[error("Live channel is not open")]
    NotConnected,

    // ── Data ────────────────────────────────────────────────────────
    /// Outbound message or command failed shape validation.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Local storage ───────────────────────────────────────────────
    /// Reading or writing a persisted record failed.
    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Extract the application `retCode`, if available.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}
