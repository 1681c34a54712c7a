// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation executors.
//!
//! This module provides the two ways a catalog operation can reach the backend:
//! - `hub`: invocation over the real-time hub session
//! - `http`: request/response over the REST API
//!
//! Both return the same JSON value for the same operation and arguments, so
//! callers never branch on which one ran.

pub mod http;
pub mod hub;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, SdkError};
use crate::types::ApiResponse;

pub use http::HttpExecutor;
pub use hub::HubExecutor;

/// Which transport an executor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Hub invocation
    RealTime,
    /// REST call
    RequestResponse,
}

/// Executor trait for catalog operations.
///
/// This trait abstracts the transport, allowing the refresh registry and the
/// view layer to run the same operation over the hub or over REST.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Transport used by this executor.
    fn kind(&self) -> ExecutorKind;

    /// Run an operation with positional arguments and return its result payload.
    async fn execute(&self, method: &str, args: Vec<Value>) -> Result<Value>;
}

/// Turn a result carrying the backend's error envelope into `SdkError::Remote`.
pub fn check_api_response(value: Value) -> Result<Value> {
    match ApiResponse::from_value(&value) {
        Some(ApiResponse {
            is_error: true,
            error_message,
        }) => Err(SdkError::Remote {
            message: error_message.unwrap_or_else(|| "operation failed".to_string()),
        }),
        _ => Ok(value),
    }
}
