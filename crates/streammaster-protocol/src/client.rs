// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebSocket client for the StreamMaster hub.
//!
//! A [`HubClient`] represents exactly one established connection. It does not
//! reconnect on its own; once the socket drops every pending invocation fails
//! and a [`HubEvent::Closed`] is emitted. Reconnection is the caller's job.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{Instant, Interval};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::frame::{
    Completion, FrameError, HandshakeRequest, HandshakeResponse, HubMessage, Invocation,
    RecordBuffer,
};

/// Errors that can occur in the hub client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("no connection established")]
    NotConnected,

    #[error("connection closed before completion")]
    ConnectionClosed,

    #[error("remote error: {0}")]
    Remote(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("connection timed out after {0}ms")]
    Timeout(u64),
}

/// Configuration for the hub client
#[derive(Debug, Clone)]
pub struct HubClientConfig {
    /// Full WebSocket URL of the hub (ws:// or wss://)
    pub url: String,
    /// Connect + handshake timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Interval between client pings in milliseconds (0 to disable)
    pub keep_alive_interval_ms: u64,
    /// Drop the connection if nothing is received for this long (0 to disable)
    pub server_timeout_ms: u64,
    /// Extra request headers (e.g. an API key)
    pub headers: Vec<(String, String)>,
}

impl Default for HubClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:7095/hub".to_string(),
            connect_timeout_ms: 10_000,
            keep_alive_interval_ms: 15_000,
            server_timeout_ms: 30_000,
            headers: Vec::new(),
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReason {
    /// Error reported by the server or the transport, if any
    pub error: Option<String>,
    /// Server hint that reconnecting is allowed
    pub allow_reconnect: bool,
    /// True when [`HubClient::close`] (or drop) ended the connection
    pub local: bool,
}

/// Messages pushed from the connection to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Server-to-client invocation (an event such as `DataRefresh`)
    Invocation(Invocation),
    /// The connection is gone. Always the last event.
    Closed(CloseReason),
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Completion>>>>;

/// One live connection to the hub.
pub struct HubClient {
    outbound: mpsc::UnboundedSender<HubMessage>,
    pending: PendingMap,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl HubClient {
    /// Open the socket, perform the protocol handshake and start the I/O tasks.
    ///
    /// Returns the client and the receiver of server-pushed events.
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn connect(
        config: &HubClientConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HubEvent>), ClientError> {
        let mut request = config.url.as_str().into_client_request()?;
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            request.headers_mut().insert(header_name, header_value);
        }

        info!("connecting to hub");

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let (mut socket, _) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| ClientError::Timeout(config.connect_timeout_ms))??;

        socket
            .send(Message::text(HandshakeRequest::default().encode()?))
            .await?;

        let mut buffer = RecordBuffer::new();
        let leftover = tokio::time::timeout(timeout, read_handshake(&mut socket, &mut buffer))
            .await
            .map_err(|_| ClientError::Timeout(config.connect_timeout_ms))??;

        info!("hub handshake completed");

        let (sink, stream) = socket.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let keep_alive = (config.keep_alive_interval_ms > 0).then(|| {
            let period = Duration::from_millis(config.keep_alive_interval_ms);
            tokio::time::interval_at(Instant::now() + period, period)
        });
        let idle_timeout = if config.server_timeout_ms > 0 {
            Duration::from_millis(config.server_timeout_ms)
        } else {
            Duration::MAX
        };

        tokio::spawn(write_loop(sink, outbound_rx, keep_alive, shutdown.clone()));
        tokio::spawn(read_loop(
            stream,
            ReadState {
                buffer,
                leftover,
                pending: pending.clone(),
                events: events_tx,
                idle_timeout,
                shutdown: shutdown.clone(),
            },
        ));

        Ok((
            Self {
                outbound: outbound_tx,
                pending,
                next_id: AtomicU64::new(0),
                shutdown,
            },
            events_rx,
        ))
    }

    /// Invoke a hub method and wait for its completion.
    #[instrument(skip(self, arguments), fields(method = %target))]
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();

        {
            // Checked under the lock: the reader cancels before it drains `pending`.
            let mut pending = self.pending.lock().await;
            if self.shutdown.is_cancelled() {
                return Err(ClientError::NotConnected);
            }
            pending.insert(id.clone(), tx);
        }

        if self
            .outbound
            .send(HubMessage::invocation(id.clone(), target, arguments))
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::NotConnected);
        }

        let completion = rx.await.map_err(|_| ClientError::ConnectionClosed)?;
        debug!(invocation_id = %id, "completion received");

        match completion.error {
            Some(error) => Err(ClientError::Remote(error)),
            None => Ok(completion.result.unwrap_or(Value::Null)),
        }
    }

    /// Invoke a hub method without waiting for a result.
    pub fn send(&self, target: &str, arguments: Vec<Value>) -> Result<(), ClientError> {
        if self.shutdown.is_cancelled() {
            return Err(ClientError::NotConnected);
        }
        self.outbound
            .send(HubMessage::send(target, arguments))
            .map_err(|_| ClientError::NotConnected)
    }

    /// Close the connection. Pending invocations fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Check if the connection is still open
    pub fn is_connected(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Resolves once the connection has ended, for whatever reason.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    /// Number of invocations still waiting for a completion.
    pub async fn pending_invocations(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Drop for HubClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Read until the handshake response arrives; returns any records that followed it.
async fn read_handshake<S>(
    stream: &mut S,
    buffer: &mut RecordBuffer,
) -> Result<Vec<String>, ClientError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let mut records = buffer.push(text.as_str())?;
                if records.is_empty() {
                    continue;
                }
                let response = HandshakeResponse::decode(&records.remove(0))?;
                if let Some(error) = response.error {
                    return Err(ClientError::Handshake(error));
                }
                return Ok(records);
            }
            Some(Ok(Message::Close(_))) | None => return Err(ClientError::ConnectionClosed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<HubMessage>,
    mut keep_alive: Option<Interval>,
    shutdown: CancellationToken,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = next_tick(&mut keep_alive) => HubMessage::Ping,
        };

        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode hub message");
                continue;
            }
        };

        if let Err(e) = sink.send(Message::text(text)).await {
            warn!(error = %e, "hub write failed");
            shutdown.cancel();
            break;
        }
    }
    debug!("hub writer stopped");
}

struct ReadState {
    buffer: RecordBuffer,
    leftover: Vec<String>,
    pending: PendingMap,
    events: mpsc::UnboundedSender<HubEvent>,
    idle_timeout: Duration,
    shutdown: CancellationToken,
}

impl ReadState {
    /// Route one record. Returns the close reason when the server closes.
    async fn dispatch(&self, record: &str) -> Option<CloseReason> {
        let message = match HubMessage::decode(record) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping undecodable hub record");
                return None;
            }
        };

        match message {
            HubMessage::Invocation(invocation) => {
                trace!(method = %invocation.target, "server invocation");
                let _ = self.events.send(HubEvent::Invocation(invocation));
                None
            }
            HubMessage::Completion(completion) => {
                let waiter = self.pending.lock().await.remove(&completion.invocation_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(completion);
                    }
                    None => warn!(
                        invocation_id = %completion.invocation_id,
                        "completion for unknown invocation"
                    ),
                }
                None
            }
            HubMessage::Ping => None,
            HubMessage::Close(close) => Some(CloseReason {
                error: close.error,
                allow_reconnect: close.allow_reconnect,
                local: false,
            }),
        }
    }
}

async fn read_loop<S>(mut stream: S, mut state: ReadState)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut reason = None;
    for record in std::mem::take(&mut state.leftover) {
        if let Some(close) = state.dispatch(&record).await {
            reason = Some(close);
            break;
        }
    }

    let reason = match reason {
        Some(reason) => reason,
        None => loop {
            let next = tokio::select! {
                biased;

                _ = state.shutdown.cancelled() => break CloseReason {
                    local: true,
                    ..CloseReason::default()
                },
                next = tokio::time::timeout(state.idle_timeout, stream.next()) => next,
            };

            let text = match next {
                Err(_) => {
                    break CloseReason {
                        error: Some("server timeout elapsed without receiving a message".into()),
                        allow_reconnect: true,
                        local: false,
                    };
                }
                Ok(None) | Ok(Some(Ok(Message::Close(_)))) => {
                    break CloseReason {
                        allow_reconnect: true,
                        ..CloseReason::default()
                    };
                }
                Ok(Some(Err(e))) => {
                    break CloseReason {
                        error: Some(e.to_string()),
                        allow_reconnect: true,
                        local: false,
                    };
                }
                Ok(Some(Ok(Message::Text(text)))) => text,
                Ok(Some(Ok(_))) => continue,
            };

            let records = match state.buffer.push(text.as_str()) {
                Ok(records) => records,
                Err(e) => {
                    break CloseReason {
                        error: Some(e.to_string()),
                        allow_reconnect: true,
                        local: false,
                    };
                }
            };

            let mut closed = None;
            for record in records {
                if let Some(close) = state.dispatch(&record).await {
                    closed = Some(close);
                    break;
                }
            }
            if let Some(close) = closed {
                break close;
            }
        },
    };

    state.shutdown.cancel();
    // Dropping the senders fails every waiting invocation.
    state.pending.lock().await.clear();

    info!(
        error = reason.error.as_deref().unwrap_or(""),
        local = reason.local,
        "hub connection closed"
    );
    let _ = state.events.send(HubEvent::Closed(reason));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubClientConfig::default();
        assert_eq!(config.url, "ws://127.0.0.1:7095/hub");
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.keep_alive_interval_ms, 15_000);
        assert_eq!(config.server_timeout_ms, 30_000);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_client_error_display() {
        let err = ClientError::NotConnected;
        assert_eq!(format!("{}", err), "no connection established");

        let err = ClientError::Timeout(5000);
        assert_eq!(format!("{}", err), "connection timed out after 5000ms");

        let err = ClientError::Remote("M3U file not found".to_string());
        assert_eq!(format!("{}", err), "remote error: M3U file not found");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let config = HubClientConfig {
            url: "ws://127.0.0.1:59994/hub".to_string(),
            connect_timeout_ms: 500,
            ..Default::default()
        };
        let result = HubClient::connect(&config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_header_rejected() {
        let config = HubClientConfig {
            url: "ws://127.0.0.1:59993/hub".to_string(),
            headers: vec![("bad header".to_string(), "v".to_string())],
            ..Default::default()
        };
        let result = HubClient::connect(&config).await;
        assert!(matches!(result, Err(ClientError::InvalidHeader(_))));
    }
}
