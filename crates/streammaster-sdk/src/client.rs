// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Main SDK client for talking to a StreamMaster backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::backend::{ExecutorKind, HttpExecutor, HubExecutor, OperationExecutor};
use crate::config::SdkConfig;
use crate::error::Result;
use crate::operations::Catalog;
use crate::registry::{RefreshHandle, RefreshRegistry, ReplayOutcome};
use crate::session::HubSession;
use crate::types::{ConnectionState, Notification};
use crate::view::QueryView;

/// Sends each call over the hub while it is connected, over REST otherwise.
struct FallbackExecutor {
    hub: HubExecutor,
    http: Arc<HttpExecutor>,
}

impl FallbackExecutor {
    fn select(&self) -> &dyn OperationExecutor {
        if self.hub.session().is_connected() {
            &self.hub
        } else {
            self.http.as_ref()
        }
    }
}

#[async_trait]
impl OperationExecutor for FallbackExecutor {
    fn kind(&self) -> ExecutorKind {
        self.select().kind()
    }

    async fn execute(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.select().execute(method, args).await
    }
}

/// High-level StreamMaster client.
///
/// Owns the hub session, the REST executor and the refresh registry, and
/// picks the transport per call: the hub while it is connected, REST while
/// it is not. Cloning is cheap and shares everything.
///
/// # Example
///
/// ```ignore
/// use streammaster_sdk::{QueryParameters, StreamMasterSdk};
///
/// let sdk = StreamMasterSdk::from_env()?;
/// sdk.connect().await?;
///
/// let params = QueryParameters::page(1, 25).to_argument();
/// let (page, _handle) = sdk
///     .query("GetPagedM3UFiles", vec![params], |refreshed| println!("{:?}", refreshed))
///     .await?;
///
/// sdk.mutate("RefreshM3UFile", vec![serde_json::json!({"id": 1})]).await?;
/// ```
#[derive(Clone)]
pub struct StreamMasterSdk {
    config: SdkConfig,
    catalog: Arc<Catalog>,
    session: HubSession,
    hub: HubExecutor,
    http: Arc<HttpExecutor>,
    registry: RefreshRegistry,
}

impl StreamMasterSdk {
    /// Create a client with the standard operation catalog. Nothing connects yet.
    pub fn new(config: SdkConfig) -> Result<Self> {
        Self::with_catalog(config, Arc::new(Catalog::default()))
    }

    /// Create a client with a custom operation catalog.
    pub fn with_catalog(config: SdkConfig, catalog: Arc<Catalog>) -> Result<Self> {
        let session = HubSession::with_catalog(&config, catalog.clone())?;
        let hub = HubExecutor::new(session.clone());
        let http = Arc::new(HttpExecutor::new(&config, catalog.clone())?);

        let executor: Arc<dyn OperationExecutor> = Arc::new(FallbackExecutor {
            hub: hub.clone(),
            http: http.clone(),
        });
        let registry = RefreshRegistry::new(executor, catalog.clone());
        registry.attach(&session);

        Ok(Self {
            config,
            catalog,
            session,
            hub,
            http,
            registry,
        })
    }

    /// Create a client from `STREAMMASTER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(SdkConfig::from_env()?)
    }

    /// Create a client for a backend on this machine.
    pub fn localhost() -> Result<Self> {
        Self::new(SdkConfig::localhost()?)
    }

    /// Start the hub session in the background without waiting.
    pub fn start(&self) {
        self.session.start();
    }

    /// Start the hub session and wait up to the connect timeout for it.
    ///
    /// On failure the session keeps retrying in the background and calls
    /// fall back to REST meanwhile.
    #[instrument(skip(self), fields(base_url = %self.config.base_url))]
    pub async fn connect(&self) -> Result<()> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        self.session.connect(timeout).await?;
        info!("connected to StreamMaster hub");
        Ok(())
    }

    /// Close the session and drop every stored query.
    pub fn close(&self) {
        self.session.close();
        self.registry.clear(None);
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn session(&self) -> &HubSession {
        &self.session
    }

    pub fn registry(&self) -> &RefreshRegistry {
        &self.registry
    }

    /// The REST executor, regardless of connection state.
    pub fn http(&self) -> &HttpExecutor {
        &self.http
    }

    /// The executor a call would use right now.
    pub fn executor(&self) -> &dyn OperationExecutor {
        if self.session.is_connected() {
            &self.hub
        } else {
            self.http.as_ref()
        }
    }

    /// Run a query and keep it live through the refresh registry.
    ///
    /// `callback` receives every replayed result until the returned handle
    /// is dropped.
    pub async fn query<F>(
        &self,
        method: &str,
        args: Vec<Value>,
        callback: F,
    ) -> Result<(Value, RefreshHandle)>
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        self.registry
            .invoke_with_refresh(method, args, callback)
            .await
    }

    /// Run an operation once, without storing anything.
    #[instrument(skip(self, args), fields(method = %method))]
    pub async fn fetch(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.executor().execute(method, args).await
    }

    /// Run an operation once and deserialize its result.
    pub async fn fetch_as<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T> {
        let value = self.fetch(method, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Run a state-changing operation.
    ///
    /// Over the hub, the server's own change notifications refresh the
    /// stored queries. Over REST there are none, so the stored queries of the
    /// mutated entity are re-fetched here before returning. A failure is also
    /// published to the message listeners as an error notification.
    #[instrument(skip(self, args), fields(method = %method))]
    pub async fn mutate(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let executor = self.executor();
        let over_rest = executor.kind() == ExecutorKind::RequestResponse;

        let result = executor.execute(method, args).await;
        match &result {
            Ok(_) if over_rest => {
                if let Some(op) = self.catalog.operation(method) {
                    let outcome = self.registry.replay(&op.entity).await;
                    if let ReplayOutcome::Replayed(count) = outcome {
                        debug!(entity = %op.entity, count, "re-fetched stored queries after REST mutation");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "mutation failed");
                self.session.events().publish_message(&Notification::error(
                    format!("{} failed", method),
                    e.to_string(),
                ));
            }
        }
        result
    }

    /// A live view of one query method.
    pub fn view(&self, method: impl Into<String>) -> QueryView {
        QueryView::new(self.clone(), method)
    }
}
