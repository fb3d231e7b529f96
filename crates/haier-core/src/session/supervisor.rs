// ── Reconnect supervisor and heartbeat ──
//
// One supervisor runs per connect/disconnect lifetime and is the only place
// reconnect sequences start, so they are serialized by construction.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use haier_api::Envelope;
use haier_api::sign::{now_millis, sequence_id};
use haier_api::websocket::calculate_backoff;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ConnectionStatus, SessionInner};

/// Reports from a link's background tasks.
#[derive(Debug)]
pub(super) enum LinkSignal {
    /// The link of `generation` can no longer carry frames.
    Lost { generation: u64, reason: String },
}

pub(super) async fn supervise(
    inner: Arc<SessionInner>,
    mut signals: mpsc::UnboundedReceiver<LinkSignal>,
    cancel: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };

        let LinkSignal::Lost { generation, reason } = signal;
        if !inner.detach(generation).await {
            debug!(generation, "ignoring signal from a replaced link");
            continue;
        }
        warn!(generation, %reason, "live channel lost");
        reconnect(&inner, &cancel).await;
    }
    debug!("session supervisor exiting");
}

/// Retry with exponential backoff until the channel is back, the attempt
/// cap is hit, or the session is disconnected.
async fn reconnect(inner: &Arc<SessionInner>, cancel: &CancellationToken) {
    if inner.reconnecting.swap(true, Ordering::AcqRel) {
        debug!("reconnect already running");
        return;
    }
    let policy = &inner.config.reconnect;

    loop {
        if cancel.is_cancelled() || inner.is_attached().await {
            break;
        }

        let attempt = inner.reconnect_attempts.load(Ordering::Acquire);
        if attempt >= policy.max_attempts {
            error!(
                max_attempts = policy.max_attempts,
                "live channel reconnect limit reached, giving up"
            );
            break;
        }

        let delay = calculate_backoff(attempt, policy);
        inner.reconnect_attempts.store(attempt + 1, Ordering::Release);
        inner.set_status_if_live(cancel, ConnectionStatus::Connecting).await;
        info!(
            attempt = attempt + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting live channel"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = inner.establish(cancel) => result,
        };
        match result {
            Ok(()) => {
                info!(attempt = attempt + 1, "live channel restored");
                break;
            }
            Err(e) => warn!(attempt = attempt + 1, error = %e, "reconnect attempt failed"),
        }
    }

    inner.settle_status(cancel).await;
    inner.reconnecting.store(false, Ordering::Release);
}

/// Send a heartbeat every `period` on the link of `generation`. A failed
/// send reports the link lost instead of retrying.
pub(super) async fn heartbeat_loop(
    inner: Arc<SessionInner>,
    generation: u64,
    period: Duration,
    cancel: CancellationToken,
    signals: mpsc::UnboundedSender<LinkSignal>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sn = sequence_id(now_millis());
        if let Err(e) = inner.send_on(generation, &Envelope::heartbeat(&sn)).await {
            if cancel.is_cancelled() {
                break;
            }
            warn!(generation, error = %e, "heartbeat failed");
            let _ = signals.send(LinkSignal::Lost {
                generation,
                reason: format!("heartbeat failed: {e}"),
            });
            break;
        }
    }
    debug!(generation, "heartbeat stopped");
}
