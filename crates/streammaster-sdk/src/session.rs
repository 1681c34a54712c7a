// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hub session: one persistent, self-healing connection to the backend hub.
//!
//! The session owns a supervisor task that connects, pumps server events
//! into the [`EventRouter`], and reconnects with capped exponential backoff
//! after any drop that it did not cause itself. Callers share one session by
//! cloning the handle; the supervisor stops when the last handle is dropped
//! or [`HubSession::close`] is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use streammaster_protocol::{CloseReason, HubClient, HubClientConfig, HubEvent};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::backend::check_api_response;
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::events::{EventHandler, EventRouter, ListenerId};
use crate::lock;
use crate::operations::Catalog;
use crate::types::{ClearByTag, ConnectionState, FieldData, Notification, ReconnectPolicy};

/// Shared handle to the hub session.
#[derive(Clone)]
pub struct HubSession {
    inner: Arc<SessionInner>,
    _lifetime: Arc<StopOnDrop>,
}

struct SessionInner {
    config: HubClientConfig,
    policy: ReconnectPolicy,
    router: EventRouter,
    client: Mutex<Option<Arc<HubClient>>>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

/// Stops the supervisor once no session handle is left.
struct StopOnDrop(CancellationToken);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl SessionInner {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "hub session state changed");
            *current = state;
            true
        });
    }

    fn current_client(&self) -> Option<Arc<HubClient>> {
        lock(&self.client).clone()
    }

    fn replace_client(&self, client: Option<Arc<HubClient>>) -> Option<Arc<HubClient>> {
        std::mem::replace(&mut *lock(&self.client), client)
    }
}

impl HubSession {
    /// Create a session with the standard operation catalog.
    ///
    /// Nothing connects until [`start`](Self::start) or [`connect`](Self::connect).
    pub fn new(config: &SdkConfig) -> Result<Self> {
        Self::with_catalog(config, Arc::new(Catalog::default()))
    }

    /// Create a session whose entity-change routing uses the given catalog.
    pub fn with_catalog(config: &SdkConfig, catalog: Arc<Catalog>) -> Result<Self> {
        let hub_config = config.hub_client_config()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shutdown = CancellationToken::new();

        Ok(Self {
            inner: Arc::new(SessionInner {
                config: hub_config,
                policy: config.reconnect_policy(),
                router: EventRouter::new(catalog),
                client: Mutex::new(None),
                state,
                shutdown: shutdown.clone(),
                started: AtomicBool::new(false),
            }),
            _lifetime: Arc::new(StopOnDrop(shutdown)),
        })
    }

    /// Start the connection supervisor. Calling it again has no effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.inner.shutdown.is_cancelled() || self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(url = %self.inner.config.url, "starting hub session");
        tokio::spawn(supervise(self.inner.clone()));
    }

    /// Start the supervisor and wait until the first connection is up.
    pub async fn connect(&self, timeout: Duration) -> Result<()> {
        self.start();
        self.wait_connected(timeout).await
    }

    /// Wait until the session is connected.
    ///
    /// Fails with `Connection` after `timeout`, or `Closed` if the session is closed.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut state = self.inner.state.subscribe();
        tokio::select! {
            biased;

            _ = self.inner.shutdown.cancelled() => Err(SdkError::Closed),

            waited = tokio::time::timeout(timeout, state.wait_for(ConnectionState::is_connected)) => {
                match waited {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(_)) => Err(SdkError::Closed),
                    Err(_) => Err(SdkError::Connection(format!(
                        "hub not connected after {} ms",
                        timeout.as_millis()
                    ))),
                }
            }
        }
    }

    /// Close the session for good. Pending invocations fail; no reconnect follows.
    pub fn close(&self) {
        info!("closing hub session");
        self.inner.shutdown.cancel();
        if let Some(client) = self.inner.replace_client(None) {
            client.close();
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Observe state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Invoke a hub method and wait for its result.
    ///
    /// Fails immediately with `NotConnected` while no connection is up, and
    /// with `Remote` when the server reports an error, including a result
    /// payload flagged with `isError`.
    #[instrument(skip(self, args), fields(method = %method))]
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SdkError::Closed);
        }
        let client = self
            .inner
            .current_client()
            .ok_or(SdkError::NotConnected)?;

        let result = client.invoke(method, args).await;
        match result {
            Ok(value) => check_api_response(value),
            Err(e) => {
                let err = SdkError::from(e);
                debug!(error = %err, "hub invocation failed");
                Err(err)
            }
        }
    }

    /// Invoke a hub method and deserialize its result.
    pub async fn invoke_as<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T> {
        let value = self.invoke(method, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Invoke a hub method without waiting for a result.
    pub fn send(&self, method: &str, args: Vec<Value>) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SdkError::Closed);
        }
        let client = self
            .inner
            .current_client()
            .ok_or(SdkError::NotConnected)?;
        client.send(method, args)?;
        Ok(())
    }

    /// Install the single handler for an event name, replacing any previous one.
    ///
    /// Returns `false` for reserved event names; use the listener methods for those.
    pub fn on<F>(&self, event: &str, handler: F) -> bool
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        self.inner.router.on(event, handler)
    }

    /// Remove the handler for an event name.
    pub fn off(&self, event: &str) -> bool {
        self.inner.router.off(event)
    }

    pub fn add_message_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.router.add_message_listener(listener)
    }

    pub fn add_data_refresh_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Vec<String>) + Send + Sync + 'static,
    {
        self.inner.router.add_data_refresh_listener(listener)
    }

    pub fn add_set_field_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Vec<FieldData>) + Send + Sync + 'static,
    {
        self.inner.router.add_set_field_listener(listener)
    }

    pub fn add_clear_by_tag_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ClearByTag) + Send + Sync + 'static,
    {
        self.inner.router.add_clear_by_tag_listener(listener)
    }

    pub fn add_logout_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.inner.router.add_logout_listener(listener)
    }

    pub fn add_entity_changed_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.inner.router.add_entity_changed_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.router.remove_listener(id)
    }

    /// The router behind this session, for local publishing.
    pub fn events(&self) -> &EventRouter {
        &self.inner.router
    }
}

/// Connect, pump events, and reconnect until shutdown.
async fn supervise(inner: Arc<SessionInner>) {
    let mut attempt: u32 = 0;

    while !inner.shutdown.is_cancelled() {
        inner.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            result = HubClient::connect(&inner.config) => result,
        };

        match connected {
            Ok((client, events)) => {
                attempt = 0;
                let client = Arc::new(client);
                inner.replace_client(Some(client.clone()));
                inner.set_state(ConnectionState::Connected);
                info!("hub session connected");

                let reason = pump_events(&inner, &client, events).await;

                inner.replace_client(None);
                inner.set_state(ConnectionState::Disconnected);
                match reason {
                    Some(reason) if !reason.local => warn!(
                        error = ?reason.error,
                        allow_reconnect = reason.allow_reconnect,
                        "hub connection lost"
                    ),
                    _ => debug!("hub connection closed locally"),
                }
            }
            Err(e) => {
                inner.set_state(ConnectionState::Disconnected);
                warn!(error = %e, attempt, "hub connection attempt failed");
            }
        }

        if inner.shutdown.is_cancelled() {
            break;
        }

        attempt = attempt.saturating_add(1);
        let delay = inner.policy.delay_for_attempt(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling hub reconnect");

        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    if let Some(client) = inner.replace_client(None) {
        client.close();
    }
    inner.set_state(ConnectionState::Disconnected);
    debug!("hub session supervisor stopped");
}

/// Deliver server events until the connection ends. `None` means shutdown.
async fn pump_events(
    inner: &SessionInner,
    client: &HubClient,
    mut events: mpsc::UnboundedReceiver<HubEvent>,
) -> Option<CloseReason> {
    loop {
        tokio::select! {
            biased;

            _ = inner.shutdown.cancelled() => {
                client.close();
                return None;
            }

            event = events.recv() => match event {
                Some(HubEvent::Invocation(invocation)) => {
                    let outcome = inner.router.dispatch(&invocation);
                    trace!(event = %invocation.target, ?outcome, "hub event dispatched");
                }
                Some(HubEvent::Closed(reason)) => return Some(reason),
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> HubSession {
        // Port 9 (discard) is never a hub; nothing connects in these tests
        let config = SdkConfig::new("http://127.0.0.1:9").unwrap();
        HubSession::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_invoke_before_start_is_not_connected() {
        let session = session();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        let err = session.invoke("GetSettings", vec![]).await.unwrap_err();
        assert!(matches!(err, SdkError::NotConnected));
        assert!(matches!(session.send("Ping", vec![]), Err(SdkError::NotConnected)));
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let session = session();
        session.close();
        assert!(session.is_closed());
        assert!(matches!(
            session.invoke("GetSettings", vec![]).await,
            Err(SdkError::Closed)
        ));
        assert!(matches!(
            session.wait_connected(Duration::from_millis(10)).await,
            Err(SdkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_wait_connected_times_out() {
        let session = session();
        let err = session
            .wait_connected(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Connection(_)));
    }

    #[test]
    fn test_dropping_last_handle_stops_supervisor() {
        let session = session();
        let token = session.inner.shutdown.clone();
        let clone = session.clone();
        drop(session);
        assert!(!token.is_cancelled());
        drop(clone);
        assert!(token.is_cancelled());
    }
}
