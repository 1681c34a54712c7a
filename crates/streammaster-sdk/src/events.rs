// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inbound event routing.
//!
//! Server pushes arrive as hub invocations. Two registration models exist
//! side by side:
//!
//! - **Handler slots**: one handler per event name, replaced by the next
//!   `on()` for the same name (last writer wins).
//! - **Listener sets**: any number of subscribers for the reserved events
//!   (`SendMessage`, `DataRefresh`, `SetField`, `ClearByTag`, `AuthLogOut`).
//!
//! Which model an event uses is decided by the static reserved-event table;
//! reserved names never reach the handler slots.
//!
//! Independently of both, every `DataRefresh` entity and every domain event
//! the [`Catalog`] routes to an entity is announced to the entity-changed
//! listeners. The refresh registry subscribes there.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;
use streammaster_protocol::Invocation;
use tracing::{debug, trace, warn};

use crate::lock;
use crate::operations::Catalog;
use crate::types::{ClearByTag, FieldData, Notification};

/// Handler for a single-slot event. Receives the raw invocation arguments.
pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Events delivered to listener sets instead of handler slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedEvent {
    /// User-facing toast
    SendMessage,
    /// One or more entity collections changed
    DataRefresh,
    /// In-place field patches
    SetField,
    /// Drop cached rows carrying a tag
    ClearByTag,
    /// Server ended the user's session
    AuthLogOut,
}

const RESERVED_EVENTS: &[(&str, ReservedEvent)] = &[
    ("SendMessage", ReservedEvent::SendMessage),
    ("DataRefresh", ReservedEvent::DataRefresh),
    ("SetField", ReservedEvent::SetField),
    ("ClearByTag", ReservedEvent::ClearByTag),
    ("AuthLogOut", ReservedEvent::AuthLogOut),
];

impl ReservedEvent {
    /// Hub event name.
    pub fn name(&self) -> &'static str {
        RESERVED_EVENTS
            .iter()
            .find(|(_, event)| event == self)
            .map(|(name, _)| *name)
            .unwrap_or("")
    }

    /// Look up a reserved event by hub name.
    pub fn from_name(name: &str) -> Option<Self> {
        RESERVED_EVENTS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, event)| *event)
    }

    /// Check whether a hub event name is reserved.
    pub fn is_reserved(name: &str) -> bool {
        Self::from_name(name).is_some()
    }
}

/// Identifies a registered listener so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Exclusive handler per event name.
#[derive(Default)]
pub struct HandlerSlots {
    slots: HashMap<String, EventHandler>,
}

impl HandlerSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler, returning the one it replaced.
    pub fn set(&mut self, name: &str, handler: EventHandler) -> Option<EventHandler> {
        self.slots.insert(name.to_string(), handler)
    }

    /// Remove the handler for a name.
    pub fn clear(&mut self, name: &str) -> Option<EventHandler> {
        self.slots.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<EventHandler> {
        self.slots.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Subscriber set for one event payload type.
pub struct ListenerSet<T> {
    listeners: Vec<(ListenerId, Listener<T>)>,
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<T> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: ListenerId, listener: Listener<T>) {
        self.listeners.push((id, listener));
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(candidate, _)| *candidate != id);
        self.listeners.len() != before
    }

    /// Clone the current listeners so they can be called without holding a lock.
    pub fn snapshot(&self) -> Vec<Listener<T>> {
        self.listeners.iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// How an inbound invocation was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Fanned out to a reserved-event listener set
    Reserved(ReservedEvent),
    /// Passed to the handler slot for its name
    Handled,
    /// Nobody registered for the name
    Unhandled,
}

/// Routes inbound hub invocations to handlers and listeners.
pub struct EventRouter {
    catalog: Arc<Catalog>,
    next_listener: AtomicU64,
    slots: Mutex<HandlerSlots>,
    messages: Mutex<ListenerSet<Notification>>,
    data_refresh: Mutex<ListenerSet<Vec<String>>>,
    set_field: Mutex<ListenerSet<Vec<FieldData>>>,
    clear_by_tag: Mutex<ListenerSet<ClearByTag>>,
    logout: Mutex<ListenerSet<()>>,
    entity_changed: Mutex<ListenerSet<String>>,
}

impl EventRouter {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            next_listener: AtomicU64::new(1),
            slots: Mutex::new(HandlerSlots::new()),
            messages: Mutex::default(),
            data_refresh: Mutex::default(),
            set_field: Mutex::default(),
            clear_by_tag: Mutex::default(),
            logout: Mutex::default(),
            entity_changed: Mutex::default(),
        }
    }

    /// Install the single handler for a non-reserved event name.
    ///
    /// Replaces any previous handler for the name. Returns `false` (and
    /// installs nothing) for reserved names.
    pub fn on(&self, name: &str, handler: EventHandler) -> bool {
        if ReservedEvent::is_reserved(name) {
            warn!(event = %name, "reserved event cannot take a single-slot handler; use a listener");
            return false;
        }
        if lock(&self.slots).set(name, handler).is_some() {
            debug!(event = %name, "replaced existing event handler");
        }
        true
    }

    /// Remove the handler for an event name. Returns whether one was installed.
    pub fn off(&self, name: &str) -> bool {
        lock(&self.slots).clear(name).is_some()
    }

    pub fn has_handler(&self, name: &str) -> bool {
        lock(&self.slots).get(name).is_some()
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_message_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = self.next_id();
        lock(&self.messages).add(id, Arc::new(listener));
        id
    }

    pub fn add_data_refresh_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Vec<String>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        lock(&self.data_refresh).add(id, Arc::new(listener));
        id
    }

    pub fn add_set_field_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Vec<FieldData>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        lock(&self.set_field).add(id, Arc::new(listener));
        id
    }

    pub fn add_clear_by_tag_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ClearByTag) + Send + Sync + 'static,
    {
        let id = self.next_id();
        lock(&self.clear_by_tag).add(id, Arc::new(listener));
        id
    }

    pub fn add_logout_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        let id = self.next_id();
        lock(&self.logout).add(id, Arc::new(listener));
        id
    }

    /// Subscribe to entity-changed announcements (entity name).
    pub fn add_entity_changed_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        let id = self.next_id();
        lock(&self.entity_changed).add(id, Arc::new(listener));
        id
    }

    /// Remove a listener from whichever set holds it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        lock(&self.messages).remove(id)
            || lock(&self.data_refresh).remove(id)
            || lock(&self.set_field).remove(id)
            || lock(&self.clear_by_tag).remove(id)
            || lock(&self.logout).remove(id)
            || lock(&self.entity_changed).remove(id)
    }

    /// Deliver a locally produced notification to the message listeners.
    pub fn publish_message(&self, notification: &Notification) {
        let listeners = lock(&self.messages).snapshot();
        for listener in listeners {
            listener(notification);
        }
    }

    /// Announce that an entity changed.
    pub fn publish_entity_changed(&self, entity: &str) {
        let listeners = lock(&self.entity_changed).snapshot();
        trace!(entity = %entity, listeners = listeners.len(), "entity changed");
        let entity = entity.to_string();
        for listener in listeners {
            listener(&entity);
        }
    }

    /// Route one inbound invocation.
    pub fn dispatch(&self, invocation: &Invocation) -> Dispatch {
        let name = invocation.target.as_str();
        let args = invocation.arguments.as_slice();

        let outcome = match ReservedEvent::from_name(name) {
            Some(event) => {
                self.dispatch_reserved(event, args);
                Dispatch::Reserved(event)
            }
            None => {
                // Clone out of the lock so the handler may call on()/off()
                let handler = lock(&self.slots).get(name);
                match handler {
                    Some(handler) => {
                        handler(args);
                        Dispatch::Handled
                    }
                    None => Dispatch::Unhandled,
                }
            }
        };

        if let Some(entity) = self.catalog.entity_for_event(name) {
            self.publish_entity_changed(entity);
        } else if outcome == Dispatch::Unhandled {
            trace!(event = %name, "no handler for hub event");
        }

        outcome
    }

    fn dispatch_reserved(&self, event: ReservedEvent, args: &[Value]) {
        match event {
            ReservedEvent::SendMessage => {
                if let Some(notification) = first_arg::<Notification>(event, args) {
                    self.publish_message(&notification);
                }
            }
            ReservedEvent::DataRefresh => {
                let entities = entity_names(args);
                let listeners = lock(&self.data_refresh).snapshot();
                for listener in listeners {
                    listener(&entities);
                }
                for entity in &entities {
                    self.publish_entity_changed(entity);
                }
            }
            ReservedEvent::SetField => {
                let patches = match args.first() {
                    Some(Value::Array(_)) => first_arg::<Vec<FieldData>>(event, args),
                    _ => first_arg::<FieldData>(event, args).map(|patch| vec![patch]),
                };
                if let Some(patches) = patches {
                    let listeners = lock(&self.set_field).snapshot();
                    for listener in listeners {
                        listener(&patches);
                    }
                }
            }
            ReservedEvent::ClearByTag => {
                if let Some(clear) = first_arg::<ClearByTag>(event, args) {
                    let listeners = lock(&self.clear_by_tag).snapshot();
                    for listener in listeners {
                        listener(&clear);
                    }
                }
            }
            ReservedEvent::AuthLogOut => {
                let listeners = lock(&self.logout).snapshot();
                for listener in listeners {
                    listener(&());
                }
            }
        }
    }
}

fn first_arg<T: DeserializeOwned>(event: ReservedEvent, args: &[Value]) -> Option<T> {
    let Some(value) = args.first() else {
        warn!(event = event.name(), "reserved event without payload");
        return None;
    };
    match serde_json::from_value(value.clone()) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(event = event.name(), error = %e, "malformed reserved event payload");
            None
        }
    }
}

/// Entity names from `DataRefresh` arguments: strings, or arrays of strings.
fn entity_names(args: &[Value]) -> Vec<String> {
    let mut names = Vec::new();
    for arg in args {
        match arg {
            Value::String(name) => names.push(name.clone()),
            Value::Array(items) => {
                names.extend(items.iter().filter_map(|v| v.as_str().map(String::from)))
            }
            other => warn!(argument = %other, "ignoring non-string DataRefresh argument"),
        }
    }
    names
}
