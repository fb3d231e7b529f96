// haier-api: Async Rust client for the Haier U+ cloud (signed REST + live channel)

pub mod auth;
pub mod client;
pub mod device;
pub mod endpoints;
pub mod error;
pub mod family;
pub mod models;
pub mod sign;
pub mod storage;
pub mod transport;
pub mod websocket;

pub use auth::{Authenticator, Credentials, TokenInfo};
pub use client::HaierClient;
pub use endpoints::Endpoints;
pub use error::Error;
pub use models::{BatchCommand, CmdMsg, CommandArgs, DeviceInfo, FamilyInfo};
pub use storage::CredentialStore;
pub use transport::TransportConfig;
pub use websocket::{Envelope, ReconnectConfig, Topic, WsStream};
