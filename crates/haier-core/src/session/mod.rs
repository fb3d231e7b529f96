// ── Session ──
//
// Owns the live channel and everything that depends on it. One `Link` at a
// time sits behind `link`; attaching a new one closes the old one first,
// under the same lock. Reader and heartbeat tasks never reconnect on their
// own: they report `LinkSignal::Lost` to the supervisor task, which runs
// reconnect sequences one at a time.

mod command;
mod link;
mod supervisor;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use haier_api::websocket::open_transport;
use haier_api::{CredentialStore, DeviceInfo, Envelope, FamilyInfo, HaierClient, TokenInfo};
use indexmap::IndexSet;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::event::SessionEvent;
use crate::model::DigitalModel;
use crate::store::{DiskCache, lock};

pub use command::CommandRoute;

use link::Link;
use supervisor::LinkSignal;

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Public state types ───────────────────────────────────────────────

/// Live-channel status as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
    /// The declared subscription set, replayed after every reconnect.
    pub subscribed_device_ids: Vec<String>,
    pub heartbeat_active: bool,
}

// ── Session ──────────────────────────────────────────────────────────

/// A persistent client session against the Haier cloud.
///
/// Cheaply cloneable; clones share one connection, cache and event stream.
/// Call [`disconnect`](Self::disconnect) to stop background tasks.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    client: HaierClient,
    cache: DiskCache<DigitalModel>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<SessionEvent>,
    subscribed: Mutex<IndexSet<String>>,
    reconnect_attempts: AtomicU32,
    reconnecting: AtomicBool,
    heartbeat_active: AtomicBool,
    /// The single live transport, if any.
    link: tokio::sync::Mutex<Option<Link>>,
    /// Bumped on every attach; signals from older links are ignored.
    generation: AtomicU64,
    cancel: CancellationToken,
    /// Cancelled on disconnect and replaced so a later connect starts fresh.
    cancel_child: Mutex<CancellationToken>,
    /// Sender side of the running supervisor, if one is running.
    signals: Mutex<Option<mpsc::UnboundedSender<LinkSignal>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.inner.client.auth().username())
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session. Opens the model cache but does not touch the network.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let store = CredentialStore::new(config.storage_dir.clone());
        let client = HaierClient::new(
            config.credentials.clone(),
            store,
            config.endpoints.clone(),
            &config.transport,
        )?;
        let cache = DiskCache::open(config.digital_models_dir(), config.cache_write_mode)?;
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                client,
                cache,
                status,
                events,
                subscribed: Mutex::new(IndexSet::new()),
                reconnect_attempts: AtomicU32::new(0),
                reconnecting: AtomicBool::new(false),
                heartbeat_active: AtomicBool::new(false),
                link: tokio::sync::Mutex::new(None),
                generation: AtomicU64::new(0),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                signals: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The signed REST client this session uses.
    pub fn client(&self) -> &HaierClient {
        &self.inner.client
    }

    /// The digital-model cache, keyed by device id.
    pub fn cache(&self) -> &DiskCache<DigitalModel> {
        &self.inner.cache
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the live channel.
    ///
    /// Resolves once the channel is open and the current subscription set
    /// has been replayed. A call while a connect or reconnect is already in
    /// progress is a no-op. A failed connect is returned to the caller and
    /// does not start automatic reconnection.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        if inner.reconnecting.load(Ordering::Acquire) {
            debug!("reconnect in progress, ignoring connect");
            return Ok(());
        }

        let mut entered = false;
        inner.status.send_if_modified(|status| {
            if *status == ConnectionStatus::Connecting {
                false
            } else {
                *status = ConnectionStatus::Connecting;
                entered = true;
                true
            }
        });
        if !entered {
            debug!("connect already in progress");
            return Ok(());
        }

        let cancel = inner.ensure_supervisor();
        match inner.establish(&cancel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "live channel connect failed");
                inner.settle_status(&cancel).await;
                Err(e)
            }
        }
    }

    /// Tear down the live channel, stop heartbeat and reconnection, and
    /// flush the cache. A later [`connect`](Self::connect) is allowed.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        {
            let mut child = lock(&inner.cancel_child);
            child.cancel();
            *child = inner.cancel.child_token();
        }
        lock(&inner.signals).take();

        {
            let mut slot = inner.link.lock().await;
            if let Some(link) = slot.take() {
                link.close().await;
            }
            inner.heartbeat_active.store(false, Ordering::Release);
            inner.status.send_replace(ConnectionStatus::Disconnected);
        }

        if let Err(e) = inner.cache.flush() {
            warn!(error = %e, "cache flush on disconnect failed");
        }
        info!("session disconnected");
    }

    /// Snapshot of the session state.
    pub fn state(&self) -> SessionState {
        let inner = &self.inner;
        SessionState {
            status: *inner.status.borrow(),
            reconnect_attempts: inner.reconnect_attempts.load(Ordering::Acquire),
            subscribed_device_ids: inner.subscribed_ids(),
            heartbeat_active: inner.heartbeat_active.load(Ordering::Acquire),
        }
    }

    /// Subscribe to status transitions.
    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Subscribe to session events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // ── Live channel ─────────────────────────────────────────────────

    /// Send one envelope on the live channel.
    ///
    /// Invalid envelopes are rejected before anything is written. Nothing
    /// is queued: without an open channel this fails with `NotConnected`.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), CoreError> {
        envelope.validate()?;
        self.inner.send_current(envelope).await
    }

    /// Declare the full set of devices to receive pushes for.
    ///
    /// The set replaces the previous one and is replayed after every
    /// reconnect. It is stored even when the channel is closed, in which
    /// case this returns `NotConnected` and the set goes out on the next
    /// successful connect.
    pub async fn subscribe_devices<I, S>(&self, device_ids: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices: IndexSet<String> = device_ids.into_iter().map(Into::into).collect();
        if devices.iter().any(|id| id.trim().is_empty()) {
            return Err(CoreError::ValidationFailed {
                message: "device ids must be non-empty".into(),
            });
        }
        let envelope = Envelope::bound_devs(&devices);
        *lock(&self.inner.subscribed) = devices;
        self.send(&envelope).await
    }

    // ── REST surface ─────────────────────────────────────────────────

    /// Force a fresh login.
    pub async fn login(&self) -> Result<Arc<TokenInfo>, CoreError> {
        Ok(self.inner.client.login().await?)
    }

    pub async fn family_list(&self) -> Result<Vec<FamilyInfo>, CoreError> {
        Ok(self.inner.client.family_list().await?)
    }

    pub async fn devices_by_family_id(&self, family_id: &str) -> Result<Vec<DeviceInfo>, CoreError> {
        Ok(self.inner.client.devices_by_family_id(family_id).await?)
    }

    /// A device's digital model, from cache unless `force_update` is set or
    /// the device has never been seen. Fetched models replace the cached one.
    pub async fn get_dev_digital_model(
        &self,
        device_id: &str,
        force_update: bool,
    ) -> Result<Arc<DigitalModel>, CoreError> {
        if !force_update {
            if let Some(model) = self.inner.cache.get(device_id) {
                debug!(device_id, "digital model served from cache");
                return Ok(model);
            }
        }

        let mut details = self.inner.client.dev_digital_models(&[device_id]).await?;
        let raw = details
            .shift_remove(device_id)
            .filter(|v| !v.is_null())
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_id: device_id.to_owned(),
            })?;
        let model = parse_detail(&raw).map_err(|message| CoreError::UnexpectedResponse {
            message: format!("digital model for {device_id}: {message}"),
        })?;
        debug!(device_id, attributes = model.attributes.len(), "digital model fetched");
        Ok(self.inner.cache.set(device_id, model))
    }
}

/// `detailInfo` values arrive either as a JSON-encoded string or inline.
fn parse_detail(raw: &Value) -> Result<DigitalModel, String> {
    match raw {
        Value::String(text) => {
            let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
            DigitalModel::from_value_lenient(&value)
        }
        other => DigitalModel::from_value_lenient(other),
    }
}

// ── Internals ────────────────────────────────────────────────────────

impl SessionInner {
    fn subscribed_ids(&self) -> Vec<String> {
        lock(&self.subscribed).iter().cloned().collect()
    }

    fn publish_model(&self, device_id: &str, model: Arc<DigitalModel>) {
        // No receivers is fine.
        let _ = self.events.send(SessionEvent::DevDigitalModelUpdate {
            device_id: device_id.to_owned(),
            model,
        });
    }

    /// Start the supervisor for this connection lifetime if none is running.
    fn ensure_supervisor(self: &Arc<Self>) -> CancellationToken {
        let cancel = lock(&self.cancel_child).clone();
        let mut signals = lock(&self.signals);
        if signals.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            *signals = Some(tx);
            tokio::spawn(supervisor::supervise(Arc::clone(self), rx, cancel.clone()));
        }
        cancel
    }

    fn signal_sender(&self) -> Option<mpsc::UnboundedSender<LinkSignal>> {
        lock(&self.signals).clone()
    }

    /// Resolve a gateway URL, open the transport and attach it.
    async fn establish(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), CoreError> {
        let url = self.client.websocket_url().await?;
        let stream = open_transport(&url, self.config.connect_timeout).await?;
        self.attach_transport(stream, cancel).await
    }

    /// Replace the current transport with `stream`.
    ///
    /// Under the link lock: close the previous link, replay the
    /// subscription set as the first frame, mark the session open, then
    /// start the reader and heartbeat for the new link.
    async fn attach_transport(
        self: &Arc<Self>,
        stream: haier_api::WsStream,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        let mut slot = self.link.lock().await;
        let signals = match self.signal_sender() {
            Some(tx) if !cancel.is_cancelled() => tx,
            _ => {
                return Err(CoreError::ConnectionFailed {
                    reason: "session disconnected while connecting".into(),
                });
            }
        };

        if let Some(old) = slot.take() {
            debug!(generation = old.generation, "closing previous live channel");
            old.close().await;
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (mut link, reader) = Link::new(generation, stream, cancel.child_token());

        let devices = self.subscribed_ids();
        if !devices.is_empty() {
            if let Err(e) = link.send(&Envelope::bound_devs(&devices)).await {
                link.close().await;
                return Err(e);
            }
            info!(generation, count = devices.len(), "device subscriptions replayed");
        }

        self.reconnect_attempts.store(0, Ordering::Release);
        self.heartbeat_active.store(true, Ordering::Release);
        self.status.send_replace(ConnectionStatus::Open);

        tokio::spawn(link::read_loop(
            Arc::clone(self),
            generation,
            reader,
            link.cancel_token(),
            signals.clone(),
        ));
        tokio::spawn(supervisor::heartbeat_loop(
            Arc::clone(self),
            generation,
            self.config.heartbeat_interval,
            link.cancel_token(),
            signals,
        ));

        *slot = Some(link);
        info!(generation, "live channel open");
        Ok(())
    }

    /// Close the link of `generation` if it is still current.
    ///
    /// Returns `false` when that link was already replaced or closed.
    async fn detach(&self, generation: u64) -> bool {
        let mut slot = self.link.lock().await;
        if slot.as_ref().is_none_or(|link| link.generation != generation) {
            return false;
        }
        if let Some(link) = slot.take() {
            link.close().await;
        }
        self.heartbeat_active.store(false, Ordering::Release);
        self.status.send_replace(ConnectionStatus::Disconnected);
        true
    }

    async fn is_attached(&self) -> bool {
        self.link.lock().await.is_some()
    }

    async fn set_status_if_live(&self, cancel: &CancellationToken, status: ConnectionStatus) {
        let _slot = self.link.lock().await;
        if !cancel.is_cancelled() {
            self.status.send_replace(status);
        }
    }

    /// Publish the status that matches the link slot, unless the session
    /// was disconnected in the meantime.
    async fn settle_status(&self, cancel: &CancellationToken) {
        let slot = self.link.lock().await;
        if cancel.is_cancelled() {
            return;
        }
        let status = if slot.is_some() {
            ConnectionStatus::Open
        } else {
            ConnectionStatus::Disconnected
        };
        self.status.send_replace(status);
    }

    /// Send on whatever link is current.
    async fn send_current(&self, envelope: &Envelope) -> Result<(), CoreError> {
        let mut slot = self.link.lock().await;
        let link = slot.as_mut().ok_or(CoreError::NotConnected)?;
        let generation = link.generation;
        let result = link.send(envelope).await;
        drop(slot);
        if let Err(ref e) = result {
            self.report_lost(generation, format!("send failed: {e}"));
        }
        result
    }

    /// Send on the link of `generation` only.
    async fn send_on(&self, generation: u64, envelope: &Envelope) -> Result<(), CoreError> {
        let mut slot = self.link.lock().await;
        match slot.as_mut() {
            Some(link) if link.generation == generation => link.send(envelope).await,
            _ => Err(CoreError::NotConnected),
        }
    }

    fn report_lost(&self, generation: u64, reason: String) {
        if let Some(tx) = self.signal_sender() {
            let _ = tx.send(LinkSignal::Lost { generation, reason });
        }
    }
}
