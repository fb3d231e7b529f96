// ── Runtime session configuration ──
//
// Describes *how* to reach the cloud and where to keep local state. The
// CLI (via haier-config) builds a `SessionConfig` and hands it in; core
// never reads config files.

use std::path::PathBuf;
use std::time::Duration;

use haier_api::websocket::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL};
use haier_api::{Credentials, Endpoints, ReconnectConfig, TransportConfig};

use crate::store::WriteMode;

/// Subdirectory of `storage_dir` holding one file per device model.
pub const DIGITAL_MODELS_DIR: &str = "digital-models";

/// Configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub credentials: Credentials,
    /// Root for the token record, client identity and model cache.
    pub storage_dir: PathBuf,
    pub endpoints: Endpoints,
    /// HTTP timeout and locale headers.
    pub transport: TransportConfig,
    /// Bound on opening the live channel.
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectConfig,
    pub cache_write_mode: WriteMode,
}

impl SessionConfig {
    /// Production endpoints and default tuning.
    pub fn new(credentials: Credentials, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            storage_dir: storage_dir.into(),
            endpoints: Endpoints::default(),
            transport: TransportConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectConfig::default(),
            cache_write_mode: WriteMode::default(),
        }
    }

    pub fn digital_models_dir(&self) -> PathBuf {
        self.storage_dir.join(DIGITAL_MODELS_DIR)
    }
}
