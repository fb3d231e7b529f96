// Shared transport configuration for building reqwest::Client instances.
//
// Every request to the cloud carries the same application identity headers,
// so they are installed once as client defaults here rather than per call.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::Error;
use crate::sign::{APP_ID, APP_KEY};

/// Default request timeout for REST calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub language: String,
    pub timezone: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
            language: "zh-CN".into(),
            timezone: "+8".into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` carrying the fixed application headers
    /// (`appId`, `appKey`, `language`, `timezone`).
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        headers.insert("appId", HeaderValue::from_static(APP_ID));
        headers.insert("appKey", HeaderValue::from_static(APP_KEY));
        headers.insert("language", header_value("language", &self.language)?);
        headers.insert("timezone", header_value("timezone", &self.timezone)?);

        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("haier-iot/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(Error::Transport)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| Error::Validation {
        message: format!("invalid `{name}` header value: {e}"),
    })
}
