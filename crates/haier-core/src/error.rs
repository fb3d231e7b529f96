// ── Core error types ──
//
// User-facing errors from haier-core. Consumers never see raw HTTP or
// JSON failures; the `From<haier_api::Error>` impl translates wire-level
// errors into the session's taxonomy.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the Haier cloud: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Live channel is not open")]
    NotConnected,

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Unexpected response from the cloud: {message}")]
    UnexpectedResponse { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error [{code}]: {message}")]
    Api { code: String, message: String },

    // ── Local storage ────────────────────────────────────────────────
    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

// ── Conversion from wire-level errors ────────────────────────────────

impl From<haier_api::Error> for CoreError {
    fn from(err: haier_api::Error) -> Self {
        match err {
            haier_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            haier_api::Error::Api { code, message } => CoreError::Api { code, message },
            haier_api::Error::Transport(e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_ms: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            }
            haier_api::Error::InvalidUrl(e) => CoreError::ConnectionFailed {
                reason: format!("invalid URL: {e}"),
            },
            haier_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            haier_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed { reason },
            haier_api::Error::NotConnected => CoreError::NotConnected,
            haier_api::Error::Validation { message } => CoreError::ValidationFailed { message },
            haier_api::Error::Deserialization { message, .. } => {
                CoreError::UnexpectedResponse { message }
            }
            haier_api::Error::Storage { path, source } => CoreError::Storage { path, source },
        }
    }
}
