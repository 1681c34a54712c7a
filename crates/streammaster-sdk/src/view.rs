// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! View-side state for live queries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::client::StreamMasterSdk;
use crate::error::{Result, SdkError};
use crate::lock;
use crate::registry::RefreshHandle;

/// What a view shows for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    /// Failed; `retryable` distinguishes a lost connection from a rejected request
    Error { message: String, retryable: bool },
}

impl<T> ViewState<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => ViewState::Ready(value),
            Err(e) => Self::from_error(&e),
        }
    }

    pub fn from_error(err: &SdkError) -> Self {
        ViewState::Error {
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ViewState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ViewState<U> {
        match self {
            ViewState::Loading => ViewState::Loading,
            ViewState::Ready(value) => ViewState::Ready(f(value)),
            ViewState::Error { message, retryable } => ViewState::Error { message, retryable },
        }
    }
}

/// Hands out request tickets; only the most recent one is current.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    latest: Arc<AtomicU64>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request. Every earlier guard stops being current.
    pub fn begin(&self) -> CurrentGuard {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        CurrentGuard {
            latest: self.latest.clone(),
            ticket,
        }
    }

    /// Make every outstanding guard stale.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}

/// "Still current" token for one request.
#[derive(Debug, Clone)]
pub struct CurrentGuard {
    latest: Arc<AtomicU64>,
    ticket: u64,
}

impl CurrentGuard {
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.ticket
    }
}

/// A live query bound to one method, as a view would hold it.
///
/// The state is published on a watch channel and follows server-side
/// changes through the refresh registry until the view is dropped.
pub struct QueryView {
    sdk: StreamMasterSdk,
    method: String,
    state: Arc<watch::Sender<ViewState<Value>>>,
    tracker: RequestTracker,
    handle: Mutex<Option<RefreshHandle>>,
}

impl QueryView {
    pub fn new(sdk: StreamMasterSdk, method: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ViewState::Loading);
        Self {
            sdk,
            method: method.into(),
            state: Arc::new(state),
            tracker: RequestTracker::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Current state.
    pub fn state(&self) -> ViewState<Value> {
        self.state.borrow().clone()
    }

    /// Observe state changes, including those caused by replays.
    pub fn subscribe(&self) -> watch::Receiver<ViewState<Value>> {
        self.state.subscribe()
    }

    /// Run the query with new arguments.
    ///
    /// If another `load` starts before this one finishes, this result is
    /// dropped and the returned state is whatever the view shows now.
    pub async fn load(&self, args: Vec<Value>) -> ViewState<Value> {
        let guard = self.tracker.begin();
        self.state.send_replace(ViewState::Loading);

        let state = self.state.clone();
        let refresh_guard = guard.clone();
        let outcome = self
            .sdk
            .query(&self.method, args, move |result| {
                if refresh_guard.is_current() {
                    state.send_replace(ViewState::from_result(result));
                }
            })
            .await;

        if !guard.is_current() {
            debug!(method = %self.method, "discarding result of superseded load");
            return self.state();
        }

        let next = match outcome {
            Ok((value, handle)) => {
                *lock(&self.handle) = Some(handle);
                ViewState::Ready(value)
            }
            Err(e) => ViewState::from_error(&e),
        };
        self.state.send_replace(next.clone());
        next
    }

    /// Stop following server changes. Late results are discarded.
    pub fn close(&self) {
        self.tracker.invalidate();
        lock(&self.handle).take();
    }
}

impl Drop for QueryView {
    fn drop(&mut self) {
        self.close();
    }
}
