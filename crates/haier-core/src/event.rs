// ── Session events ──

use std::sync::Arc;

use crate::model::DigitalModel;

/// Everything a session publishes to its subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A device's cached model changed, from a push or a local command.
    DevDigitalModelUpdate {
        device_id: String,
        model: Arc<DigitalModel>,
    },
}

impl SessionEvent {
    pub fn device_id(&self) -> &str {
        match self {
            Self::DevDigitalModelUpdate { device_id, .. } => device_id,
        }
    }
}
