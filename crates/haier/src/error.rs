//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use haier_config::ConfigError;
use haier_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Haier cloud: {reason}")]
    #[diagnostic(
        code(haier::connection_failed),
        help(
            "Check your network connection and the endpoint URLs in your profile.\n\
             Run with -vv for the full request log."
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(haier::auth_failed),
        help(
            "Verify the username and password for this profile.\n\
             Run: haier login -v"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(haier::no_credentials),
        help(
            "Create a profile with: haier config init --username <USER>\n\
             Or set HAIER_USERNAME and HAIER_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(haier::not_found),
        help("Run: haier {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(haier::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(haier::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(haier::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: haier config init --name {name} --username <USER>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(haier::no_config),
        help(
            "Create one with: haier config init --username <USER>\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(haier::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(haier::timeout),
        help("Raise `timeout` or `connect_timeout` in the config file.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Local storage ────────────────────────────────────────────────
    #[error("Storage error: {message}")]
    #[diagnostic(
        code(haier::storage),
        help("Check that the storage directory is writable, or pass --storage-dir.")
    )]
    Storage { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(haier::serialization))]
    Serialization(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::NotConnected => CliError::ConnectionFailed {
                reason: "the live channel is not open".into(),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Timeout { timeout_ms } => CliError::Timeout { timeout_ms },
            CoreError::DeviceNotFound { device_id } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: device_id,
                list_command: "devices <FAMILY_ID>".into(),
            },
            CoreError::UnexpectedResponse { message } => CliError::ApiError {
                code: "unexpected_response".into(),
                message,
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Api { code, message } => CliError::ApiError { code, message },
            err @ CoreError::Storage { .. } => CliError::Storage {
                message: err.to_string(),
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
