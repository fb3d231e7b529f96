//! Shared configuration for the Haier tools.
//!
//! TOML profiles, credential resolution (env + plaintext) and translation
//! to `haier_core::SessionConfig`. The CLI adds flag-aware wrappers on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use haier_core::{Credentials, Endpoints, ReconnectConfig, SessionConfig, WriteMode};

/// Environment variable that overrides every configured password.
pub const PASSWORD_ENV: &str = "HAIER_PASSWORD";

/// Environment variable used when a profile has no username.
pub const USERNAME_ENV: &str = "HAIER_USERNAME";

const APP_QUALIFIER: &str = "net";
const APP_ORGANIZATION: &str = "haier";
const APP_NAME: &str = "haier-iot";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' is not defined")]
    UnknownProfile { profile: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Live-channel connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Heartbeat period in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_heartbeat_interval() -> u64 {
    60
}

/// A named account profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account username (usually a phone number).
    pub username: Option<String>,

    /// Password (plaintext; prefer `password_env`).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Root for tokens, client identity and the model cache.
    pub storage_dir: Option<PathBuf>,

    /// Override the account host (login, families, devices).
    pub account_url: Option<String>,

    /// Override the uws host (models, commands, gateway assignment).
    pub uws_url: Option<String>,

    /// Override the HTTP timeout (seconds).
    pub timeout: Option<u64>,

    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: Option<u32>,

    /// First reconnect delay in milliseconds; doubles per attempt.
    pub reconnect_base_delay_ms: Option<u64>,

    /// Upper bound on one reconnect delay in milliseconds. Unbounded when unset.
    pub reconnect_max_delay_ms: Option<u64>,

    /// Cache write coalescing window in milliseconds; `0` writes through.
    pub cache_debounce_ms: Option<u64>,
}

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
            .to_owned();
        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::UnknownProfile { profile: name }),
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", APP_NAME, "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default storage root: the platform cache directory.
pub fn default_storage_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".cache", APP_NAME]),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

// ── Loading & saving ────────────────────────────────────────────────

/// Load defaults, then `path`, then `HAIER_*` environment overrides.
///
/// Nested keys use a double underscore: `HAIER_DEFAULTS__TIMEOUT=30`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HAIER_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load the full config from the canonical path and environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the password: `HAIER_PASSWORD`, then the profile's
/// `password_env`, then the plaintext `password`.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    if let Some(ref env_name) = profile.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            return Ok(SecretString::from(pw));
        }
    }

    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve username and password for a profile.
pub fn resolve_credentials(profile: &Profile, profile_name: &str) -> Result<Credentials, ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })?;
    let password = resolve_password(profile, profile_name)?;
    Ok(Credentials { username, password })
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `SessionConfig` from a profile and the global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let credentials = resolve_credentials(profile, profile_name)?;
    let storage_dir = profile
        .storage_dir
        .clone()
        .unwrap_or_else(default_storage_dir);

    let mut config = SessionConfig::new(credentials, storage_dir);

    let mut endpoints = Endpoints::default();
    if let Some(ref raw) = profile.account_url {
        endpoints.account = parse_url("account_url", raw)?;
    }
    if let Some(ref raw) = profile.uws_url {
        endpoints.uws = parse_url("uws_url", raw)?;
    }
    config.endpoints = endpoints;

    config.transport.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.connect_timeout = Duration::from_secs(defaults.connect_timeout);
    config.heartbeat_interval = Duration::from_secs(defaults.heartbeat_interval);

    let fallback = ReconnectConfig::default();
    config.reconnect = ReconnectConfig {
        base_delay: profile
            .reconnect_base_delay_ms
            .map_or(fallback.base_delay, Duration::from_millis),
        max_delay: profile.reconnect_max_delay_ms.map(Duration::from_millis),
        max_attempts: profile.max_reconnect_attempts.unwrap_or(fallback.max_attempts),
    };

    config.cache_write_mode = match profile.cache_debounce_ms {
        Some(0) => WriteMode::Immediate,
        Some(ms) => WriteMode::Debounced(Duration::from_millis(ms)),
        None => WriteMode::default(),
    };

    if config.heartbeat_interval.is_zero() {
        return Err(ConfigError::Validation {
            field: "heartbeat_interval".into(),
            reason: "must be at least one second".into(),
        });
    }

    Ok(config)
}
