//! Session and synchronization layer between `haier-api` and the CLI.
//!
//! - **[`Session`]**: owns the live channel. [`connect()`](Session::connect)
//!   resolves a gateway, opens the transport and replays the device
//!   subscription set; a supervisor task reconnects with exponential backoff
//!   up to a fixed attempt cap, and a heartbeat keeps the channel warm.
//!   Pushes are decoded into the model cache and published as
//!   [`SessionEvent`]s. [`send_commands()`](Session::send_commands) prefers
//!   the live channel and falls back to REST.
//!
//! - **[`DiskCache`]**: write-back key/value store with an in-memory mirror
//!   and debounced flushes, one JSON file per key.
//!
//! - **[`codec`]**: decoder for the base64 + gzip push payloads.
//!
//! - **Domain model** ([`model`]): [`DigitalModel`] and its attributes.

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod session;
pub mod store;

pub use codec::DecodeError;
pub use config::SessionConfig;
pub use error::CoreError;
pub use event::SessionEvent;
pub use model::{Attribute, AttributeFlags, DigitalModel, ValueRange};
pub use session::{CommandRoute, ConnectionStatus, Session, SessionState};
pub use store::{DiskCache, WriteMode};

// Wire-level types callers need alongside the session.
pub use haier_api::{CommandArgs, Credentials, DeviceInfo, Endpoints, FamilyInfo, ReconnectConfig};
