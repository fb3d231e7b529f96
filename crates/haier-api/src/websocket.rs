//! Live-channel wire types and transport setup.
//!
//! Every frame on the channel is a JSON envelope `{ "topic": ..., "content": ... }`.
//! This module owns the envelope shape, the known topics, the connect step
//! (bounded by a timeout) and the reconnect backoff policy. The session state
//! machine that drives them lives in `haier-core`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use crate::client::HaierClient;
use crate::endpoints::Endpoints;
use crate::error::Error;
use crate::models::{AssignData, CmdMsg, DataEnvelope};

/// A connected live-channel stream.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default bound on establishing the live channel.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default heartbeat period once the channel is open.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Reconnect attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ── Topics ───────────────────────────────────────────────────────────

/// Topics understood on the live channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr,
)]
pub enum Topic {
    HeartBeat,
    HeartBeatAck,
    BoundDevs,
    BatchCmdReq,
    GenMsgDown,
}

// ── Envelope ─────────────────────────────────────────────────────────

/// The `{topic, content}` wrapper used for every live-channel message.
///
/// `topic` stays a string so unknown topics survive parsing and can be
/// logged by the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    pub fn new(topic: Topic, content: Value) -> Self {
        Self {
            topic: topic.to_string(),
            content,
        }
    }

    /// Keep-alive frame.
    pub fn heartbeat(sn: &str) -> Self {
        Self::new(Topic::HeartBeat, json!({ "sn": sn, "duration": 0 }))
    }

    /// Declare the full set of devices this client wants pushes for.
    pub fn bound_devs<I, S>(device_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let devs: Vec<String> = device_ids
            .into_iter()
            .map(|id| id.as_ref().to_owned())
            .collect();
        Self::new(Topic::BoundDevs, json!({ "devs": devs }))
    }

    /// Batch command request; `trace` correlates the request in server logs.
    pub fn batch_cmd(trace: &str, sn: &str, data: &[CmdMsg]) -> Self {
        Self::new(
            Topic::BatchCmdReq,
            json!({ "trace": trace, "sn": sn, "data": data }),
        )
    }

    /// The topic as a known [`Topic`], if it is one.
    pub fn known_topic(&self) -> Option<Topic> {
        self.topic.parse().ok()
    }

    /// Check the envelope shape: a non-empty string topic.
    pub fn validate(&self) -> Result<(), Error> {
        if self.topic.trim().is_empty() {
            return Err(Error::Validation {
                message: "envelope topic must be a non-empty string".into(),
            });
        }
        Ok(())
    }

    /// Parse and validate an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let envelope: Self = serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Serialize for transmission, validating first.
    pub fn to_text(&self) -> Result<String, Error> {
        self.validate()?;
        serde_json::to_string(self).map_err(|e| Error::Validation {
            message: format!("unserializable envelope: {e}"),
        })
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for live-channel reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub base_delay: Duration,

    /// Optional upper bound on a single delay. Default: unbounded.
    pub max_delay: Option<Duration>,

    /// Attempts before giving up. Default: 5.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: None,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff without jitter.
///
/// `delay = base * 2^attempt`, clamped to `max_delay` only when one is set.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let factor = 2_u32.saturating_pow(attempt);
    let delay = config.base_delay.saturating_mul(factor);
    match config.max_delay {
        Some(max) => delay.min(max),
        None => delay,
    }
}

// ── Connect ──────────────────────────────────────────────────────────

/// Open the live channel, failing with [`Error::Timeout`] if the handshake
/// does not complete within `timeout`.
pub async fn open_transport(url: &Url, timeout: Duration) -> Result<WsStream, Error> {
    info!(
        host = url.host_str().unwrap_or_default(),
        path = url.path(),
        "connecting live channel"
    );

    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str())).await {
        Err(_) => Err(Error::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
        Ok(Err(e)) => Err(Error::WebSocketConnect(e.to_string())),
        Ok(Ok((stream, response))) => {
            debug!(status = %response.status(), "live channel handshake complete");
            Ok(stream)
        }
    }
}

impl HaierClient {
    /// Request a gateway assignment and build the live-channel URL.
    ///
    /// The URL embeds a fresh access token and the client identity.
    ///
    /// `POST /gmsWS/wsag/assign`
    pub async fn websocket_url(&self) -> Result<Url, Error> {
        let url = self.endpoints().ws_assign()?;
        let envelope: DataEnvelope<AssignData> = self.post(url, &json!({})).await?;
        let token = self.auth().access_token().await?;
        let client_id = self.auth().client_id()?;
        Endpoints::gateway(&envelope.data.ag_addr, &token, &client_id)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
