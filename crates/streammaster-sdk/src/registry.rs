// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Refresh registry: replays stored queries when their entity changes.
//!
//! A view that wants live data calls [`RefreshRegistry::invoke_with_refresh`]
//! instead of a plain invoke. The result comes back as usual, and the
//! registry remembers `method -> (arguments, callback)`. When the server later
//! announces that an entity changed, every stored query routed to that
//! entity is invoked again with the same arguments and the fresh result is
//! handed to the callback.
//!
//! There is at most one mapping per method. Each mapping carries a
//! generation; a replay only delivers if its mapping is still the current one
//! when the result arrives, so a view that has been torn down or re-queried
//! never receives a stale result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::backend::OperationExecutor;
use crate::error::Result;
use crate::events::ListenerId;
use crate::lock;
use crate::operations::Catalog;
use crate::session::HubSession;

/// Receives the result of every replay for a stored query.
pub type RefreshCallback = Arc<dyn Fn(Result<Value>) + Send + Sync>;

/// What an entity-changed notification caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// No stored query is routed to the name
    Ignored,
    /// This many stored queries were invoked again
    Replayed(usize),
}

struct Mapping {
    args: Vec<Value>,
    callback: RefreshCallback,
    generation: u64,
}

#[derive(Default)]
struct MappingTable {
    mappings: HashMap<String, Mapping>,
    /// Generations at or below these marks were cleared before they completed
    cleared: HashMap<String, u64>,
    cleared_all: u64,
}

impl MappingTable {
    fn is_cleared(&self, method: &str, generation: u64) -> bool {
        generation <= self.cleared_all
            || self
                .cleared
                .get(method)
                .is_some_and(|mark| generation <= *mark)
    }
}

struct RegistryInner {
    executor: Arc<dyn OperationExecutor>,
    catalog: Arc<Catalog>,
    table: Mutex<MappingTable>,
    generation: AtomicU64,
}

struct ReplayJob {
    method: String,
    args: Vec<Value>,
    callback: RefreshCallback,
    generation: u64,
}

impl RegistryInner {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, method: &str, generation: u64) -> bool {
        lock(&self.table)
            .mappings
            .get(method)
            .is_some_and(|m| m.generation == generation)
    }

    /// Store a mapping unless a newer call or a clear has overtaken it.
    fn store(&self, method: &str, args: Vec<Value>, callback: RefreshCallback, generation: u64) -> bool {
        let mut table = lock(&self.table);
        if table.is_cleared(method, generation) {
            return false;
        }
        if let Some(existing) = table.mappings.get(method)
            && existing.generation > generation
        {
            return false;
        }
        table.mappings.insert(
            method.to_string(),
            Mapping {
                args,
                callback,
                generation,
            },
        );
        true
    }

    fn remove_if_current(&self, method: &str, generation: u64) {
        let mut table = lock(&self.table);
        if table
            .mappings
            .get(method)
            .is_some_and(|m| m.generation == generation)
        {
            table.mappings.remove(method);
            trace!(method = %method, "refresh mapping released");
        }
    }

    /// Snapshot the mappings a name refers to: queries of that entity, or the method itself.
    fn plan(&self, name: &str) -> Vec<ReplayJob> {
        let mut methods = self.catalog.queries_for_entity(name);
        if !methods.contains(&name) {
            methods.push(name);
        }

        let table = lock(&self.table);
        methods
            .into_iter()
            .filter_map(|method| {
                table.mappings.get(method).map(|m| ReplayJob {
                    method: method.to_string(),
                    args: m.args.clone(),
                    callback: m.callback.clone(),
                    generation: m.generation,
                })
            })
            .collect()
    }

    async fn run(&self, job: ReplayJob) {
        let result = self.executor.execute(&job.method, job.args).await;
        if self.is_current(&job.method, job.generation) {
            (job.callback)(result);
        } else {
            debug!(method = %job.method, "dropping replay result for a replaced mapping");
        }
    }
}

/// Stored queries and their replay on entity changes.
#[derive(Clone)]
pub struct RefreshRegistry {
    inner: Arc<RegistryInner>,
}

impl RefreshRegistry {
    /// Create a registry that runs queries (initial and replays) through `executor`.
    pub fn new(executor: Arc<dyn OperationExecutor>, catalog: Arc<Catalog>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                executor,
                catalog,
                table: Mutex::new(MappingTable::default()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Replay on the session's entity-changed announcements.
    ///
    /// The session only holds a weak reference; dropping the registry detaches it.
    pub fn attach(&self, session: &HubSession) -> ListenerId {
        let registry = Arc::downgrade(&self.inner);
        session.add_entity_changed_listener(move |entity| {
            if let Some(inner) = Weak::upgrade(&registry) {
                RefreshRegistry { inner }.entity_changed(entity);
            }
        })
    }

    /// Run a query and keep it live.
    ///
    /// Returns the result together with a handle; dropping the handle removes
    /// the mapping, unless a later call for the same method has replaced it.
    /// A failed call stores nothing.
    #[instrument(skip(self, args, callback), fields(method = %method))]
    pub async fn invoke_with_refresh<F>(
        &self,
        method: &str,
        args: Vec<Value>,
        callback: F,
    ) -> Result<(Value, RefreshHandle)>
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        let generation = self.inner.next_generation();
        let value = self.inner.executor.execute(method, args.clone()).await?;

        if !self.inner.store(method, args, Arc::new(callback), generation) {
            debug!("query was superseded before it completed; mapping not stored");
        }

        Ok((
            value,
            RefreshHandle {
                registry: Arc::downgrade(&self.inner),
                method: method.to_string(),
                generation,
                detached: false,
            },
        ))
    }

    /// Remove one mapping, or all of them with `None`. Returns how many were removed.
    ///
    /// Calls still in flight for the cleared methods will not store a mapping.
    pub fn clear(&self, method: Option<&str>) -> usize {
        let mark = self.inner.generation.load(Ordering::SeqCst);
        let mut table = lock(&self.inner.table);
        match method {
            Some(method) => {
                table.cleared.insert(method.to_string(), mark);
                usize::from(table.mappings.remove(method).is_some())
            }
            None => {
                table.cleared_all = mark;
                table.cleared.clear();
                let removed = table.mappings.len();
                table.mappings.clear();
                removed
            }
        }
    }

    /// Handle an entity-changed notification by spawning the replays.
    ///
    /// Each call replays every matching mapping once. Must be called from
    /// within a tokio runtime.
    pub fn entity_changed(&self, name: &str) -> ReplayOutcome {
        let jobs = self.inner.plan(name);
        if jobs.is_empty() {
            trace!(name = %name, "no stored query for changed entity");
            return ReplayOutcome::Ignored;
        }

        let count = jobs.len();
        debug!(name = %name, count, "replaying stored queries");
        for job in jobs {
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.run(job).await });
        }
        ReplayOutcome::Replayed(count)
    }

    /// Replay the stored queries for a name and wait until every callback ran.
    pub async fn replay(&self, name: &str) -> ReplayOutcome {
        let jobs = self.inner.plan(name);
        if jobs.is_empty() {
            return ReplayOutcome::Ignored;
        }

        let count = jobs.len();
        join_all(jobs.into_iter().map(|job| self.inner.run(job))).await;
        ReplayOutcome::Replayed(count)
    }

    /// Check whether a method currently has a mapping.
    pub fn contains(&self, method: &str) -> bool {
        lock(&self.inner.table).mappings.contains_key(method)
    }

    /// Arguments stored for a method.
    pub fn stored_args(&self, method: &str) -> Option<Vec<Value>> {
        lock(&self.inner.table)
            .mappings
            .get(method)
            .map(|m| m.args.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.table).mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a stored query alive; dropping it removes the mapping.
#[must_use = "dropping the handle removes the refresh mapping immediately"]
pub struct RefreshHandle {
    registry: Weak<RegistryInner>,
    method: String,
    generation: u64,
    detached: bool,
}

impl RefreshHandle {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Whether this handle's mapping is still the one stored for its method.
    pub fn is_current(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.is_current(&self.method, self.generation))
    }

    /// Keep the mapping after the handle is gone; only `clear` removes it then.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            inner.remove_if_current(&self.method, self.generation);
        }
    }
}
