// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Public types for the SDK.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of the hub session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and no attempt in progress
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Handshake completed, calls are accepted
    Connected,
}

impl ConnectionState {
    /// Check if calls can currently go over the hub.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Reconnect delays for the hub session.
///
/// Retries never stop; the delay doubles per attempt and is capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    /// Create a new reconnect policy.
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
        }
    }

    /// Calculate delay for a given attempt (1-indexed).
    ///
    /// Attempt 1 is the first retry after a failed connect or a dropped
    /// connection.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self.initial_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Paging, sorting and filtering arguments shared by the paged queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameters {
    pub page_number: u32,
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub order_by: String,
    /// JSON-encoded filter list as the backend expects it
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub json_filters: String,
}

impl QueryParameters {
    /// First page with the given size.
    pub fn page(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number,
            page_size,
            ..Default::default()
        }
    }

    /// Set the sort expression, e.g. `"name asc"`.
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    /// Set the JSON filter expression.
    pub fn with_json_filters(mut self, json_filters: impl Into<String>) -> Self {
        self.json_filters = json_filters.into();
        self
    }

    /// Convert into a single invocation argument.
    pub fn to_argument(&self) -> Value {
        // Plain struct of strings and integers, cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Default for QueryParameters {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: 25,
            order_by: String::new(),
            json_filters: String::new(),
        }
    }
}

/// One page of results from a paged query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub page_number: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total_page_count: u32,
    #[serde(default)]
    pub total_item_count: u64,
}

/// Result envelope used by the backend's mutations.
///
/// A payload with `isError: true` is a failed operation even though the
/// transport reported success.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ApiResponse {
    /// Extract the error envelope from a result payload, if it carries one.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if !object.contains_key("isError") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Severity of a server notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warn,
    Error,
}

/// Payload of the `SendMessage` event: a user-facing toast.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Notification {
    /// Build an error notification.
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: Some(detail.into()),
        }
    }
}

/// One field patch from the `SetField` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldData {
    /// Entity collection the patch applies to, e.g. `"SMChannels"`
    pub entity: String,
    /// Id of the entity, as the backend renders it
    pub id: String,
    /// Property name
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

/// Payload of the `ClearByTag` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearByTag {
    pub entity: String,
    pub tag: String,
}
