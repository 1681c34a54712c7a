// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! StreamMaster SDK - real-time sync client for the StreamMaster backend.
//!
//! This crate keeps client-side data in step with a StreamMaster server. It
//! wraps the low-level `streammaster-protocol` hub client and adds the
//! subscribe / invoke / refresh contract on top of it.
//!
//! # Features
//!
//! - **Hub Session**: one persistent connection with automatic reconnect
//!   and observable connection state
//! - **Events**: single-slot handlers per event name plus multi-subscriber
//!   listeners for `SendMessage`, `DataRefresh`, `SetField`, `ClearByTag`
//!   and `AuthLogOut`
//! - **Refresh Registry**: queries remembered with their arguments and
//!   replayed when the server reports that their entity changed
//! - **REST Fallback**: the same operations over HTTP while the hub is down,
//!   with manual re-fetch after mutations
//!
//! # Quick Start
//!
//! ```ignore
//! use streammaster_sdk::{QueryParameters, StreamMasterSdk, ViewState};
//!
//! #[tokio::main]
//! async fn main() -> streammaster_sdk::Result<()> {
//!     let sdk = StreamMasterSdk::from_env()?;
//!     sdk.connect().await?;
//!
//!     // Live list of M3U files: reloads whenever M3U files change server-side
//!     let view = sdk.view("GetPagedM3UFiles");
//!     view.load(vec![QueryParameters::page(1, 25).to_argument()]).await;
//!
//!     let mut updates = view.subscribe();
//!     while updates.changed().await.is_ok() {
//!         if let ViewState::Ready(page) = &*updates.borrow() {
//!             println!("{} files", page["totalItemCount"]);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Transport selection
//!
//! ```text
//!   view / caller
//!        │  query / fetch / mutate
//!        ▼
//!   StreamMasterSdk ── connected? ──► HubExecutor ──► HubSession ──► hub (WebSocket)
//!        │                 no
//!        └──────────────────────────► HttpExecutor ──► REST API
//!
//!   hub event ──► EventRouter ──► entity changed ──► RefreshRegistry ──► replay ──► callback
//! ```

use std::sync::{Mutex, MutexGuard};

mod backend;
mod client;
mod config;
mod error;
mod events;
mod operations;
mod registry;
mod session;
mod types;
mod view;

// Re-export public types
pub use backend::{
    ExecutorKind, HttpExecutor, HubExecutor, OperationExecutor, check_api_response,
};
pub use client::StreamMasterSdk;
pub use config::{API_KEY_HEADER, SdkConfig};
pub use error::{Result, SdkError};
pub use events::{
    Dispatch, EventHandler, EventRouter, HandlerSlots, ListenerId, ListenerSet, ReservedEvent,
};
pub use operations::{Catalog, HttpVerb, Operation, OperationKind};
pub use registry::{RefreshCallback, RefreshHandle, RefreshRegistry, ReplayOutcome};
pub use session::HubSession;
pub use types::{
    ApiResponse, ClearByTag, ConnectionState, FieldData, Notification, PagedResponse,
    QueryParameters, ReconnectPolicy, Severity,
};
pub use view::{CurrentGuard, QueryView, RequestTracker, ViewState};

// Re-export protocol types that appear in the public API
pub use streammaster_protocol::{CloseReason, Invocation};

/// Lock a mutex, recovering the data if a panicking callback poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
