// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation catalog.
//!
//! Every logical backend operation has one name, used verbatim as the hub
//! method, plus a REST route (`HTTP verb` + `api/<controller>/<action>`) used
//! while the hub is unreachable. Each operation belongs to an entity; the
//! catalog also maps hub domain events onto the entity they change.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Whether an operation reads or changes server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Read-only; eligible for refresh mappings
    Query,
    /// Changes state; triggers refreshes of its entity's queries
    Mutation,
}

/// HTTP verb of an operation's REST route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    /// Convert to the reqwest method.
    pub fn as_method(&self) -> reqwest::Method {
        match self {
            HttpVerb::Get => reqwest::Method::GET,
            HttpVerb::Post => reqwest::Method::POST,
            HttpVerb::Put => reqwest::Method::PUT,
            HttpVerb::Patch => reqwest::Method::PATCH,
            HttpVerb::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_method(), f)
    }
}

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Hub method name, e.g. `GetPagedM3UFiles`
    pub name: String,
    pub verb: HttpVerb,
    /// REST path relative to the base URL, e.g. `api/m3ufiles/getpagedm3ufiles`
    pub path: String,
    pub kind: OperationKind,
    /// Entity collection, e.g. `M3UFiles`
    pub entity: String,
}

impl Operation {
    /// Build an operation routed to `api/<controller>/<lowercased name>`.
    pub fn new(
        name: impl Into<String>,
        verb: HttpVerb,
        controller: &str,
        kind: OperationKind,
        entity: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let path = format!("api/{}/{}", controller, name.to_lowercase());
        Self {
            name,
            verb,
            path,
            kind,
            entity: entity.into(),
        }
    }

    pub fn is_query(&self) -> bool {
        self.kind == OperationKind::Query
    }
}

use HttpVerb::{Delete, Get, Patch, Post};
use OperationKind::{Mutation, Query};

/// (name, verb, controller, kind, entity)
const STANDARD_OPERATIONS: &[(&str, HttpVerb, &str, OperationKind, &str)] = &[
    // M3U files
    ("GetPagedM3UFiles", Get, "m3ufiles", Query, "M3UFiles"),
    ("GetM3UFileNames", Get, "m3ufiles", Query, "M3UFiles"),
    ("CreateM3UFile", Post, "m3ufiles", Mutation, "M3UFiles"),
    ("UpdateM3UFile", Patch, "m3ufiles", Mutation, "M3UFiles"),
    ("RefreshM3UFile", Patch, "m3ufiles", Mutation, "M3UFiles"),
    ("DeleteM3UFile", Delete, "m3ufiles", Mutation, "M3UFiles"),
    // EPG files
    ("GetPagedEPGFiles", Get, "epgfiles", Query, "EPGFiles"),
    ("GetEPGFileNames", Get, "epgfiles", Query, "EPGFiles"),
    ("GetEPGColors", Get, "epgfiles", Query, "EPGFiles"),
    ("CreateEPGFile", Post, "epgfiles", Mutation, "EPGFiles"),
    ("UpdateEPGFile", Patch, "epgfiles", Mutation, "EPGFiles"),
    ("RefreshEPGFile", Patch, "epgfiles", Mutation, "EPGFiles"),
    ("DeleteEPGFile", Delete, "epgfiles", Mutation, "EPGFiles"),
    // Channels
    ("GetPagedSMChannels", Get, "smchannels", Query, "SMChannels"),
    ("CreateSMChannel", Post, "smchannels", Mutation, "SMChannels"),
    ("DeleteSMChannel", Delete, "smchannels", Mutation, "SMChannels"),
    ("SetSMChannelName", Patch, "smchannels", Mutation, "SMChannels"),
    // Streams
    ("GetPagedSMStreams", Get, "smstreams", Query, "SMStreams"),
    ("ToggleSMStreamVisibleById", Patch, "smstreams", Mutation, "SMStreams"),
    // Groups
    ("GetPagedChannelGroups", Get, "channelgroups", Query, "ChannelGroups"),
    ("GetChannelGroups", Get, "channelgroups", Query, "ChannelGroups"),
    ("CreateChannelGroup", Post, "channelgroups", Mutation, "ChannelGroups"),
    ("DeleteChannelGroup", Delete, "channelgroups", Mutation, "ChannelGroups"),
    ("GetPagedStreamGroups", Get, "streamgroups", Query, "StreamGroups"),
    ("CreateStreamGroup", Post, "streamgroups", Mutation, "StreamGroups"),
    ("DeleteStreamGroup", Delete, "streamgroups", Mutation, "StreamGroups"),
    // Settings and tasks
    ("GetSettings", Get, "settings", Query, "Settings"),
    ("UpdateSetting", Patch, "settings", Mutation, "Settings"),
    ("GetSMTasks", Get, "smtasks", Query, "SMTasks"),
];

/// (hub event, entity)
const STANDARD_EVENTS: &[(&str, &str)] = &[
    ("M3UFileCreated", "M3UFiles"),
    ("M3UFileUpdated", "M3UFiles"),
    ("M3UFileDeleted", "M3UFiles"),
    ("M3UFileProcessed", "M3UFiles"),
    ("EPGFileCreated", "EPGFiles"),
    ("EPGFileUpdated", "EPGFiles"),
    ("EPGFileDeleted", "EPGFiles"),
    ("EPGFileProcessed", "EPGFiles"),
    ("SMChannelsRefresh", "SMChannels"),
    ("SMStreamsRefresh", "SMStreams"),
    ("ChannelGroupsRefresh", "ChannelGroups"),
    ("StreamGroupsRefresh", "StreamGroups"),
    ("SettingsUpdated", "Settings"),
    ("TaskQueueStatusUpdate", "SMTasks"),
];

/// Lookup tables for operations and entity-change events.
#[derive(Debug, Clone)]
pub struct Catalog {
    operations: HashMap<String, Operation>,
    events: HashMap<String, String>,
}

impl Catalog {
    /// A catalog with no operations or events.
    pub fn empty() -> Self {
        Self {
            operations: HashMap::new(),
            events: HashMap::new(),
        }
    }

    /// Add or replace an operation.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.insert(operation.name.clone(), operation);
        self
    }

    /// Route a hub event name onto an entity.
    pub fn with_event(mut self, event: impl Into<String>, entity: impl Into<String>) -> Self {
        self.events.insert(event.into(), entity.into());
        self
    }

    /// Look up an operation by hub method name.
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Entity changed by a hub domain event, if the event is routed.
    pub fn entity_for_event(&self, event: &str) -> Option<&str> {
        self.events.get(event).map(String::as_str)
    }

    /// Query methods that read the given entity, in name order.
    pub fn queries_for_entity(&self, entity: &str) -> Vec<&str> {
        let names: BTreeSet<&str> = self
            .operations
            .values()
            .filter(|op| op.is_query() && op.entity == entity)
            .map(|op| op.name.as_str())
            .collect();
        names.into_iter().collect()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let catalog = STANDARD_OPERATIONS.iter().fold(
            Catalog::empty(),
            |catalog, (name, verb, controller, kind, entity)| {
                catalog.with_operation(Operation::new(*name, *verb, controller, *kind, *entity))
            },
        );
        STANDARD_EVENTS
            .iter()
            .fold(catalog, |catalog, (event, entity)| {
                catalog.with_event(*event, *entity)
            })
    }
}
