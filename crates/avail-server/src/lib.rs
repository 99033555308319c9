//! Avail Server - WebSocket server for the Availability Protocol
//!
//! This crate implements the server side of the Availability Protocol:
//! clients read and change availability through JSON-RPC 2.0 requests and
//! receive a push notification for every status change of the
//! professionals they subscribe to.
//!
//! The server supports:
//! - Multiple concurrent connections
//! - JSON-RPC 2.0 messages
//! - Per-professional subscriptions with ordered delivery
//! - Schedule-driven status changes

use avail_core::AvailabilityEvent;
use serde::{Deserialize, Serialize};

/// Server-to-client push messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Sent once, right after the handshake.
    Welcome(WelcomePayload),
    /// A subscribed professional changed status.
    AvailabilityChanged(AvailabilityEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    /// Identifier the server assigned to this connection.
    pub connection_id: String,
    /// Server version.
    pub version: String,
    /// Sequence of the latest committed event at connect time.
    pub last_sequence: u64,
}

mod broadcaster;
pub mod client;
mod config;
mod handlers;
pub mod protocol;
mod registry;
mod server;
mod ticker;

pub use broadcaster::Broadcaster;
pub use client::{ClientError, RpcClient};
pub use config::{ConfigError, ServerConfig};
pub use handlers::AppState;
pub use protocol::{Request, Response, RpcError};
pub use registry::{ConnectionId, ConnectionRegistry, RegistryError};
pub use server::{AvailServer, ServerError};
pub use ticker::ScheduleTicker;
