//! WebSocket client library
//!
//! Long-lived client that reconnects forever (or up to a ceiling) with
//! capped, jittered exponential backoff, replays subscription frames after
//! every connect, and publishes its connection state on a watch channel.

mod backoff;
mod client;
mod types;

pub use backoff::ReconnectBackoff;
pub use client::{WsClient, WsHandle};
pub use types::{ConnectionState, WsConfig, WsError, WsMessage};
