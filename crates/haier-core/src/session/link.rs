// One attached transport and its inbound side.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use haier_api::{Envelope, Topic, WsStream};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SessionInner;
use super::supervisor::LinkSignal;
use crate::codec;
use crate::error::CoreError;

/// Bound on the close handshake so a dead peer cannot stall a detach.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

const DIGITAL_MODEL_BUSINESS: &str = "DigitalModel";

pub(super) struct Link {
    pub(super) generation: u64,
    sink: SplitSink<WsStream, Message>,
    /// Stops this link's reader and heartbeat.
    cancel: CancellationToken,
}

impl Link {
    pub(super) fn new(
        generation: u64,
        stream: WsStream,
        cancel: CancellationToken,
    ) -> (Self, SplitStream<WsStream>) {
        let (sink, reader) = stream.split();
        (
            Self {
                generation,
                sink,
                cancel,
            },
            reader,
        )
    }

    pub(super) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(super) async fn send(&mut self, envelope: &Envelope) -> Result<(), CoreError> {
        let text = envelope.to_text()?;
        debug!(generation = self.generation, topic = %envelope.topic, "sending frame");
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| CoreError::ConnectionFailed {
                reason: format!("send failed: {e}"),
            })
    }

    /// Stop the link's tasks and close the transport.
    pub(super) async fn close(mut self) {
        self.cancel.cancel();
        match tokio::time::timeout(CLOSE_TIMEOUT, self.sink.close()).await {
            Ok(Ok(())) => debug!(generation = self.generation, "live channel closed"),
            Ok(Err(e)) => debug!(generation = self.generation, error = %e, "close handshake failed"),
            Err(_) => debug!(generation = self.generation, "close handshake timed out"),
        }
    }
}

/// Read frames in order until the transport ends or the link is cancelled.
pub(super) async fn read_loop(
    inner: Arc<SessionInner>,
    generation: u64,
    mut reader: SplitStream<WsStream>,
    cancel: CancellationToken,
    signals: mpsc::UnboundedSender<LinkSignal>,
) {
    let reason = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = reader.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => inner.handle_frame(text.as_str()),
            Some(Ok(Message::Close(frame))) => {
                break frame.map_or_else(
                    || "closed by server".to_owned(),
                    |f| format!("closed by server (code {}): {}", u16::from(f.code), f.reason.as_str()),
                );
            }
            Some(Ok(Message::Binary(bytes))) => {
                debug!(generation, len = bytes.len(), "ignoring binary frame");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_owned(),
        }
    };

    if !cancel.is_cancelled() {
        let _ = signals.send(LinkSignal::Lost { generation, reason });
    }
}

impl SessionInner {
    /// Handle one inbound text frame. Malformed frames are dropped.
    fn handle_frame(&self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match envelope.known_topic() {
            Some(Topic::HeartBeatAck) => debug!("heartbeat acknowledged"),
            Some(Topic::GenMsgDown) => self.handle_push(&envelope.content),
            Some(topic) => debug!(%topic, "ignoring frame"),
            None => debug!(topic = %envelope.topic, "ignoring unknown topic"),
        }
    }

    /// Decode a device-state push into the cache and publish it.
    fn handle_push(&self, content: &Value) {
        if let Some(kind) = content.get("businType").and_then(Value::as_str) {
            if kind != DIGITAL_MODEL_BUSINESS {
                debug!(busin_type = kind, "ignoring push");
                return;
            }
        }
        let Some(payload) = content.get("data").and_then(Value::as_str) else {
            warn!("dropping push without a data payload");
            return;
        };

        match codec::decode(payload) {
            Ok((device_id, model)) => {
                debug!(%device_id, attributes = model.attributes.len(), "digital model pushed");
                let model = self.cache.set(&device_id, model);
                self.publish_model(&device_id, model);
            }
            Err(e) => warn!(reason = e.reason(), error = %e, "dropping undecodable push"),
        }
    }
}
