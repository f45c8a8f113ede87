//! WebSocket client with automatic reconnection

use super::backoff::ReconnectBackoff;
use super::types::{ConnectionState, WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

/// Receiving side of a running client
pub struct WsHandle {
    /// Frames and lifecycle events
    pub messages: mpsc::Receiver<WsMessage>,
    /// Latest connection state
    pub state: watch::Receiver<ConnectionState>,
}

/// Reusable WebSocket client with automatic reconnection and ping keepalive
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Spawn the connection loop
    ///
    /// The loop stops when `cancel` fires, the message receiver is dropped,
    /// or the reconnect ceiling (if any) is reached.
    pub fn connect(&self, cancel: CancellationToken) -> WsHandle {
        let (tx, rx) = mpsc::channel(1024);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection_loop(config, tx, state_tx, cancel).await {
                tracing::error!(error = %e, "WebSocket connection loop failed");
            }
        });

        WsHandle {
            messages: rx,
            state: state_rx,
        }
    }

    async fn run_connection_loop(
        config: WsConfig,
        tx: mpsc::Sender<WsMessage>,
        state_tx: watch::Sender<ConnectionState>,
        cancel: CancellationToken,
    ) -> Result<(), WsError> {
        let mut backoff =
            ReconnectBackoff::new(config.initial_reconnect_delay, config.max_reconnect_delay);

        loop {
            let _ = state_tx.send(ConnectionState::Connecting);
            let mut connected_at = None;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = state_tx.send(ConnectionState::Disconnected);
                    return Ok(());
                }
                r = Self::connect_and_stream(&config, &tx, &state_tx, &mut connected_at) => r,
            };

            let _ = state_tx.send(ConnectionState::Disconnected);

            let e = match result {
                Ok(()) => {
                    tracing::debug!("Receiver dropped, stopping WebSocket client");
                    return Ok(());
                }
                Err(e) => e,
            };

            if tx.send(WsMessage::Disconnected).await.is_err() {
                return Ok(());
            }

            if connected_at.is_some_and(|at: Instant| at.elapsed() >= config.stable_after) {
                backoff.reset();
            }

            let delay = backoff.next_jittered(&mut rand::thread_rng());
            let attempt = backoff.failures();
            metrics::counter!("ignition_stream_reconnects_total").increment(1);
            tracing::warn!(
                error = %e,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "WebSocket connection error, reconnecting"
            );

            if config.max_reconnect_attempts > 0 && attempt >= config.max_reconnect_attempts {
                tracing::error!(attempt, "Max reconnection attempts reached");
                return Err(WsError::MaxReconnectsExceeded);
            }

            if tx
                .send(WsMessage::Reconnecting { attempt, delay })
                .await
                .is_err()
            {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }
    }

    /// Connect, subscribe, and pump frames until the connection ends
    ///
    /// `Ok(())` means the consumer went away; every connection loss is an
    /// error so the caller reconnects.
    async fn connect_and_stream(
        config: &WsConfig,
        tx: &mpsc::Sender<WsMessage>,
        state_tx: &watch::Sender<ConnectionState>,
        connected_at: &mut Option<Instant>,
    ) -> Result<(), WsError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&config.url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        for frame in &config.subscriptions {
            write
                .send(Message::Text(frame.clone()))
                .await
                .map_err(|e| WsError::SendFailed(e.to_string()))?;
        }

        *connected_at = Some(Instant::now());
        let _ = state_tx.send(ConnectionState::Connected);
        tracing::info!(subscriptions = config.subscriptions.len(), "WebSocket connected");

        if tx.send(WsMessage::Connected).await.is_err() {
            return Ok(());
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately
        ping_interval.tick().await;
        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if tx.send(WsMessage::Binary(data)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Received close frame");
                            return Err(WsError::ConnectionClosed);
                        }
                        Some(Err(e)) => {
                            return Err(WsError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                        }
                        _ => {}
                    }
                }

                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        return Err(WsError::ConnectionFailed("Pong timeout".into()));
                    }
                    write.send(Message::Ping(Vec::new())).await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    waiting_for_pong = true;
                }
            }
        }
    }
}
