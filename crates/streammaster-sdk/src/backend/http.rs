// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! REST executor.
//!
//! Maps a catalog operation onto `HTTP verb + api/<controller>/<action>`.
//! GET operations carry their single object argument as a query string (a
//! scalar argument becomes a trailing path segment); every other verb sends
//! the argument as a JSON body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use super::{ExecutorKind, OperationExecutor, check_api_response};
use crate::config::{API_KEY_HEADER, SdkConfig};
use crate::error::{Result, SdkError};
use crate::operations::{Catalog, HttpVerb, Operation};

/// Executes catalog operations over the REST API.
pub struct HttpExecutor {
    http: reqwest::Client,
    config: SdkConfig,
    catalog: Arc<Catalog>,
}

impl HttpExecutor {
    /// Create a REST executor for the configured backend.
    pub fn new(config: &SdkConfig, catalog: Arc<Catalog>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| SdkError::Config("API key is not a valid header value".to_string()))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config: config.clone(),
            catalog,
        })
    }

    fn request(&self, op: &Operation, args: Vec<Value>) -> Result<reqwest::RequestBuilder> {
        let mut url = self.config.api_url(&op.path)?;

        if op.verb == HttpVerb::Get {
            let mut pairs = Vec::new();
            match args.as_slice() {
                [] => {}
                [Value::Object(fields)] => pairs = query_pairs(fields),
                [Value::Array(_)] => {
                    return Err(SdkError::Serialization(format!(
                        "{} takes an object or scalar argument over REST",
                        op.name
                    )));
                }
                [scalar] => {
                    let segment = scalar_text(scalar);
                    url.path_segments_mut()
                        .map_err(|_| {
                            SdkError::Config(format!("{} cannot take path segments", op.path))
                        })?
                        .push(&segment);
                }
                _ => {
                    return Err(SdkError::Serialization(format!(
                        "{} takes at most one argument over REST, got {}",
                        op.name,
                        args.len()
                    )));
                }
            }
            return Ok(self.http.get(url).query(&pairs));
        }

        let builder = self.http.request(op.verb.as_method(), url);
        let mut args = args;
        Ok(match args.len() {
            0 => builder,
            1 => builder.json(&args.remove(0)),
            _ => builder.json(&Value::Array(args)),
        })
    }
}

#[async_trait]
impl OperationExecutor for HttpExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::RequestResponse
    }

    #[instrument(skip(self, args), fields(method = %method))]
    async fn execute(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let op = self
            .catalog
            .operation(method)
            .ok_or_else(|| SdkError::UnknownOperation(method.to_string()))?;

        debug!(verb = %op.verb, path = %op.path, "REST call");
        let response = self.request(op, args)?.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            warn!(status = status.as_u16(), message = %message, "REST call failed");
            return Err(SdkError::Http {
                status: status.as_u16(),
                message,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        check_api_response(serde_json::from_str(&body)?)
    }
}

/// Flatten one object argument into query pairs; nested values stay JSON.
fn query_pairs(fields: &Map<String, Value>) -> Vec<(String, String)> {
    fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), scalar_text(value)))
        .collect()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pick a readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => ["errorMessage", "detail", "title", "message"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str))
            .map(String::from)
            .or_else(|| Some(trimmed.to_string())),
        Err(_) => Some(trimmed.to_string()),
    }
}
