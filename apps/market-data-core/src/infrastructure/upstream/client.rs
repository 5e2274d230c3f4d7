//! Upstream Feed Client
//!
//! Owns the single WebSocket connection to the upstream price feed. The
//! outer `run` loop is the reconnect state machine (disconnected →
//! connecting → connected); the inner session loop pumps frames, heartbeats,
//! and outbound commands. Connection snapshots are published through a
//! `watch` channel so callers never touch the socket loop directly.

use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, FeedCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::messages::{FeedMessage, OutboundFrame};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{ConnectionState, ConnectionStatus};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error on an outbound frame.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection closed by the server or the stream ended.
    #[error("connection closed")]
    ConnectionClosed,

    /// Heartbeat timed out.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// Reconnection attempt budget exhausted.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Events and Commands
// =============================================================================

/// Events emitted by the feed client.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Socket open and processing frames.
    Connected,
    /// Connection lost.
    Disconnected,
    /// A reconnection attempt is pending.
    Reconnecting {
        /// Attempt number.
        attempt: u32,
    },
    /// A decoded inbound frame.
    Message(FeedMessage),
    /// A non-fatal error worth surfacing.
    Error(String),
}

/// Commands accepted by the feed client.
#[derive(Debug, Clone)]
pub enum FeedCommand {
    /// Send a frame upstream.
    Send(OutboundFrame),
    /// Close the current connection and reconnect immediately, resetting
    /// the backoff policy.
    Reconnect,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL of the upstream feed.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl FeedClientConfig {
    /// Create a configuration with default reconnect/heartbeat settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable handle for interacting with a running [`FeedClient`].
#[derive(Debug, Clone)]
pub struct FeedHandle {
    command_tx: mpsc::UnboundedSender<FeedCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl FeedHandle {
    /// Send a frame upstream.
    ///
    /// Frames submitted while the connection is not open are logged and
    /// dropped; callers never see an error for them.
    pub fn send(&self, frame: OutboundFrame) {
        if !self.state_rx.borrow().is_connected() {
            tracing::warn!(ids = ?frame.ids(), "Dropping outbound frame, not connected");
            return;
        }

        if self.command_tx.send(FeedCommand::Send(frame)).is_err() {
            tracing::warn!("Feed client has shut down, frame dropped");
        }
    }

    /// Force the client to drop the current connection and reconnect,
    /// resetting the backoff attempt counter.
    pub fn reconnect(&self) {
        if self.command_tx.send(FeedCommand::Reconnect).is_err() {
            tracing::warn!("Feed client has shut down, reconnect ignored");
        }
    }

    /// Snapshot of the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Watch receiver for connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

// =============================================================================
// Client
// =============================================================================

/// How a connected session ended.
enum SessionEnd {
    /// Shutdown requested.
    Cancelled,
    /// A manual reconnect was requested.
    ReconnectRequested,
}

/// WebSocket client for the upstream price feed.
pub struct FeedClient {
    config: FeedClientConfig,
    codec: FeedCodec,
    event_tx: mpsc::Sender<FeedEvent>,
    command_rx: mpsc::UnboundedReceiver<FeedCommand>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a new feed client and its handle.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> (Self, FeedHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());

        let client = Self {
            config,
            codec: FeedCodec::new(),
            event_tx,
            command_rx,
            state_tx,
            cancel,
        };
        let handle = FeedHandle {
            command_tx,
            state_rx,
        };

        (client, handle)
    }

    /// Run the connection loop until cancelled or the reconnect budget is
    /// exhausted.
    pub async fn run(mut self) -> Result<(), FeedClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                self.publish(|state| state.status = ConnectionStatus::Disconnected);
                return Ok(());
            }

            self.publish(|state| state.status = ConnectionStatus::Connecting);

            match self.connect_and_run(&mut policy).await {
                Ok(SessionEnd::Cancelled) => {
                    self.publish(|state| state.status = ConnectionStatus::Disconnected);
                    return Ok(());
                }
                Ok(SessionEnd::ReconnectRequested) => {
                    tracing::info!("Manual reconnect requested");
                    policy.reset();
                    self.publish(|state| {
                        state.status = ConnectionStatus::Disconnected;
                        state.reconnect_attempt = 0;
                    });
                    let _ = self.event_tx.send(FeedEvent::Disconnected).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed connection error");
                    let _ = self.event_tx.send(FeedEvent::Disconnected).await;

                    let Some(delay) = policy.next_delay() else {
                        self.publish(|state| state.status = ConnectionStatus::Error);
                        return Err(FeedClientError::MaxReconnectAttemptsExceeded);
                    };

                    let attempt = policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to upstream feed"
                    );
                    self.publish(|state| {
                        state.status = ConnectionStatus::Error;
                        state.reconnect_attempt = attempt;
                    });
                    let _ = self.event_tx.send(FeedEvent::Reconnecting { attempt }).await;

                    let sleep = tokio::time::sleep(delay);
                    tokio::pin!(sleep);
                    loop {
                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                tracing::info!("Feed client cancelled during reconnect delay");
                                self.publish(|state| state.status = ConnectionStatus::Disconnected);
                                return Ok(());
                            }
                            () = &mut sleep => break,
                            command = self.command_rx.recv() => match command {
                                Some(FeedCommand::Reconnect) => {
                                    // Manual reconnect overrides the backoff:
                                    // retry now with a fresh attempt budget.
                                    tracing::info!("Manual reconnect requested during backoff");
                                    policy.reset();
                                    self.publish(|state| state.reconnect_attempt = 0);
                                    break;
                                }
                                Some(FeedCommand::Send(frame)) => {
                                    tracing::debug!(
                                        ids = ?frame.ids(),
                                        "Discarding frame queued while disconnected"
                                    );
                                }
                                None => {
                                    // All handles dropped; nothing left to serve.
                                    self.publish(|state| state.status = ConnectionStatus::Disconnected);
                                    return Ok(());
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Connect and pump one session until it ends.
    async fn connect_and_run(
        &mut self,
        policy: &mut ReconnectPolicy,
    ) -> Result<SessionEnd, FeedClientError> {
        tracing::info!(url = %self.config.url, "Connecting to upstream feed");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Frames queued while disconnected are stale: they were already
        // reported as dropped. A pending manual reconnect is satisfied by
        // this very connection.
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                FeedCommand::Send(frame) => {
                    tracing::debug!(
                        ids = ?frame.ids(),
                        "Discarding frame queued while disconnected"
                    );
                }
                FeedCommand::Reconnect => {
                    tracing::debug!("Pending reconnect satisfied by new connection");
                }
            }
        }

        policy.reset();
        self.publish(|state| {
            state.status = ConnectionStatus::Connected;
            state.reconnect_attempt = 0;
            state.last_heartbeat_at = Some(Utc::now());
        });
        let _ = self.event_tx.send(FeedEvent::Connected).await;

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(8);
        let heartbeat_cancel = CancellationToken::new();
        let heartbeat = HeartbeatManager::new(
            self.config.heartbeat.clone(),
            heartbeat_state.clone(),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        let _heartbeat_task = tokio::spawn(heartbeat.run());

        let result = self
            .pump_session(&mut write, &mut read, &heartbeat_state, &mut heartbeat_rx)
            .await;

        heartbeat_cancel.cancel();
        result
    }

    /// Process frames, commands, and heartbeat events for one session.
    async fn pump_session<W, R>(
        &mut self,
        write: &mut W,
        read: &mut R,
        heartbeat_state: &HeartbeatState,
        heartbeat_rx: &mut mpsc::Receiver<HeartbeatEvent>,
    ) -> Result<SessionEnd, FeedClientError>
    where
        W: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
        R: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Ok(SessionEnd::Cancelled);
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(FeedCommand::Send(frame)) => {
                            let json = self.codec.encode(&frame)?;
                            tracing::debug!(ids = ?frame.ids(), "Sending frame upstream");
                            write.send(Message::Text(json.into())).await?;
                        }
                        Some(FeedCommand::Reconnect) => {
                            return Ok(SessionEnd::ReconnectRequested);
                        }
                        None => {
                            // All handles dropped; nothing left to serve.
                            return Ok(SessionEnd::Cancelled);
                        }
                    }
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::SendPing) => {
                            heartbeat_state.mark_ping_sent();
                            write.send(Message::Ping(vec![].into())).await?;
                        }
                        Some(HeartbeatEvent::Timeout) => {
                            return Err(FeedClientError::HeartbeatTimeout);
                        }
                        None => {
                            tracing::debug!("Heartbeat channel closed");
                        }
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat_state.record_pong();
                            self.touch_heartbeat();
                            self.handle_text_frame(&text).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_pong();
                            self.touch_heartbeat();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Binary frames are not part of the protocol.
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Decode one inbound text frame and forward it.
    ///
    /// A malformed frame is dropped; the connection stays open.
    async fn handle_text_frame(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(message) => {
                let _ = self.event_tx.send(FeedEvent::Message(message)).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                let _ = self
                    .event_tx
                    .send(FeedEvent::Error(format!("malformed frame: {e}")))
                    .await;
            }
        }
    }

    /// Stamp the last heartbeat time in the published state.
    fn touch_heartbeat(&self) {
        self.state_tx
            .send_modify(|state| state.last_heartbeat_at = Some(Utc::now()));
    }

    /// Publish a connection state mutation.
    fn publish<F: FnOnce(&mut ConnectionState)>(&self, mutate: F) {
        self.state_tx.send_modify(mutate);
    }
}
