//! WebSocket types and configuration

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Maximum consecutive failed connections before giving up (0 = infinite)
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnection attempt
    pub initial_reconnect_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_reconnect_delay: Duration,
    /// A connection that lasts this long resets the backoff
    pub stable_after: Duration,
    /// Interval for sending ping frames
    pub ping_interval: Duration,
    /// Text frames sent after every successful connect
    pub subscriptions: Vec<String>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            stable_after: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            subscriptions: Vec::new(),
        }
    }
}

impl WsConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.initial_reconnect_delay = d;
        self
    }

    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_reconnect_delay = d;
        self
    }

    pub fn stable_after(mut self, d: Duration) -> Self {
        self.stable_after = d;
        self
    }

    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Replace the frames sent after each connect
    pub fn subscriptions(mut self, frames: Vec<String>) -> Self {
        self.subscriptions = frames;
        self
    }
}

/// Messages delivered to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    /// Connection established and subscriptions sent
    Connected,
    /// Connection lost or closed
    Disconnected,
    /// Waiting `delay` before reconnect attempt `attempt`
    Reconnecting { attempt: u32, delay: Duration },
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// WebSocket errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_reconnect_schedule() {
        let config = WsConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0);
        assert_eq!(config.initial_reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(30));
        assert_eq!(config.stable_after, Duration::from_secs(10));
        assert!(config.subscriptions.is_empty());
    }

    #[test]
    fn test_builder_sets_every_field() {
        let config = WsConfig::new("wss://example.com")
            .max_reconnects(5)
            .initial_delay(Duration::from_millis(500))
            .max_delay(Duration::from_secs(8))
            .stable_after(Duration::from_secs(3))
            .ping_interval(Duration::from_secs(15))
            .subscriptions(vec!["{}".to_string()]);

        assert_eq!(config.url, "wss://example.com");
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.initial_reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(8));
        assert_eq!(config.stable_after, Duration::from_secs(3));
        assert_eq!(config.ping_interval, Duration::from_secs(15));
        assert_eq!(config.subscriptions.len(), 1);
    }

    #[test]
    fn test_close_is_distinct_from_failure() {
        assert_ne!(
            WsError::ConnectionClosed,
            WsError::ConnectionFailed("closed".to_string())
        );
        assert_eq!(
            WsError::ConnectionClosed.to_string(),
            "Connection closed by peer"
        );
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
