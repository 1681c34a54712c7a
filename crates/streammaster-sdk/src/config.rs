// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK configuration for connecting to a StreamMaster backend.

use std::env;

use streammaster_protocol::HubClientConfig;
use tracing::error;
use url::Url;

use crate::error::{Result, SdkError};
use crate::types::ReconnectPolicy;

/// Header carrying the API key on both the hub handshake and REST calls.
pub const API_KEY_HEADER: &str = "x-api-key";

/// SDK configuration for connecting to a StreamMaster backend.
///
/// One base URL selects both the REST root and the hub endpoint.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Backend root, always ending in `/` (e.g. `http://127.0.0.1:7095/`)
    pub base_url: Url,
    /// Hub path relative to the base URL (default: "hub")
    pub hub_path: String,
    /// Optional API key, sent as `x-api-key`
    pub api_key: Option<String>,
    /// Connection timeout in milliseconds (default: 10_000)
    pub connect_timeout_ms: u64,
    /// Keep-alive ping interval in milliseconds (default: 15_000, 0 to disable)
    pub keep_alive_interval_ms: u64,
    /// Server silence that counts as a dead connection (default: 30_000, 0 to disable)
    pub server_timeout_ms: u64,
    /// First reconnect delay in milliseconds (default: 1_000)
    pub reconnect_initial_delay_ms: u64,
    /// Reconnect delay cap in milliseconds (default: 30_000)
    pub reconnect_max_delay_ms: u64,
}

impl SdkConfig {
    /// Load configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `STREAMMASTER_BASE_URL` - Backend root, `http://` or `https://`
    ///
    /// # Optional Environment Variables
    /// - `STREAMMASTER_HUB_PATH` - Hub path (default: "hub")
    /// - `STREAMMASTER_API_KEY` - API key sent as `x-api-key`
    /// - `STREAMMASTER_CONNECT_TIMEOUT_MS` - Connection timeout (default: 10000)
    /// - `STREAMMASTER_KEEP_ALIVE_MS` - Keep-alive ping interval (default: 15000)
    /// - `STREAMMASTER_SERVER_TIMEOUT_MS` - Server idle timeout (default: 30000)
    /// - `STREAMMASTER_RECONNECT_INITIAL_MS` - First reconnect delay (default: 1000)
    /// - `STREAMMASTER_RECONNECT_MAX_MS` - Reconnect delay cap (default: 30000)
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("STREAMMASTER_BASE_URL").map_err(|_| {
            error!("STREAMMASTER_BASE_URL is not set");
            SdkError::Config("STREAMMASTER_BASE_URL is required".to_string())
        })?;

        let mut config = Self::new(&base_url)?;

        if let Ok(hub_path) = env::var("STREAMMASTER_HUB_PATH") {
            config.hub_path = hub_path;
        }

        config.api_key = env::var("STREAMMASTER_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        config.connect_timeout_ms = env_u64("STREAMMASTER_CONNECT_TIMEOUT_MS", 10_000);
        config.keep_alive_interval_ms = env_u64("STREAMMASTER_KEEP_ALIVE_MS", 15_000);
        config.server_timeout_ms = env_u64("STREAMMASTER_SERVER_TIMEOUT_MS", 30_000);
        config.reconnect_initial_delay_ms = env_u64("STREAMMASTER_RECONNECT_INITIAL_MS", 1_000);
        config.reconnect_max_delay_ms = env_u64("STREAMMASTER_RECONNECT_MAX_MS", 30_000);

        Ok(config)
    }

    /// Create a new configuration for the given base URL with default settings.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            hub_path: "hub".to_string(),
            api_key: None,
            connect_timeout_ms: 10_000,
            keep_alive_interval_ms: 15_000,
            server_timeout_ms: 30_000,
            reconnect_initial_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
        })
    }

    /// Create a configuration for a backend on this machine (`http://127.0.0.1:7095/`).
    pub fn localhost() -> Result<Self> {
        Self::new("http://127.0.0.1:7095")
    }

    /// Set the hub path.
    pub fn with_hub_path(mut self, hub_path: impl Into<String>) -> Self {
        self.hub_path = hub_path.into();
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Set the keep-alive interval. Set to 0 to disable pings.
    pub fn with_keep_alive_interval_ms(mut self, interval_ms: u64) -> Self {
        self.keep_alive_interval_ms = interval_ms;
        self
    }

    /// Set the server idle timeout. Set to 0 to disable.
    pub fn with_server_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.server_timeout_ms = timeout_ms;
        self
    }

    /// Set the reconnect delays.
    pub fn with_reconnect_delays_ms(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.reconnect_initial_delay_ms = initial_ms;
        self.reconnect_max_delay_ms = max_ms;
        self
    }

    /// Hub endpoint: the base URL joined with the hub path, `http`→`ws`, `https`→`wss`.
    pub fn hub_url(&self) -> Result<Url> {
        let mut url = self
            .base_url
            .join(self.hub_path.trim_start_matches('/'))
            .map_err(|e| SdkError::Config(format!("invalid hub path {:?}: {}", self.hub_path, e)))?;

        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| SdkError::Config(format!("cannot derive hub URL from {}", url)))?;
        Ok(url)
    }

    /// REST endpoint for a path relative to the base URL.
    pub fn api_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SdkError::Config(format!("invalid API path {:?}: {}", path, e)))
    }

    /// Reconnect policy built from the configured delays.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.reconnect_initial_delay_ms, self.reconnect_max_delay_ms)
    }

    /// Protocol-level client configuration for the hub connection.
    pub fn hub_client_config(&self) -> Result<HubClientConfig> {
        let headers = self
            .api_key
            .iter()
            .map(|key| (API_KEY_HEADER.to_string(), key.clone()))
            .collect();

        Ok(HubClientConfig {
            url: self.hub_url()?.to_string(),
            connect_timeout_ms: self.connect_timeout_ms,
            keep_alive_interval_ms: self.keep_alive_interval_ms,
            server_timeout_ms: self.server_timeout_ms,
            headers,
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| {
        error!(base_url = %raw, error = %e, "invalid StreamMaster base URL");
        SdkError::Config(format!("invalid base URL {:?}: {}", raw, e))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        error!(base_url = %raw, "StreamMaster base URL must use http or https");
        return Err(SdkError::Config(format!(
            "base URL must use http or https, got {}",
            url.scheme()
        )));
    }

    // Url::join replaces the last segment unless the path ends in '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localhost_config() {
        let config = SdkConfig::localhost().unwrap();
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:7095/");
        assert_eq!(config.hub_path, "hub");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_hub_url_scheme_mapping() {
        let plain = SdkConfig::new("http://media.local:7095").unwrap();
        assert_eq!(plain.hub_url().unwrap().as_str(), "ws://media.local:7095/hub");

        let tls = SdkConfig::new("https://media.example.com/sm/").unwrap();
        assert_eq!(
            tls.hub_url().unwrap().as_str(),
            "wss://media.example.com/sm/hub"
        );
    }

    #[test]
    fn test_base_path_is_preserved() {
        let config = SdkConfig::new("http://host/streammaster").unwrap();
        assert_eq!(
            config
                .api_url("/api/m3ufiles/getpagedm3ufiles")
                .unwrap()
                .as_str(),
            "http://host/streammaster/api/m3ufiles/getpagedm3ufiles"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            SdkConfig::new("not a url"),
            Err(SdkError::Config(_))
        ));
        assert!(matches!(
            SdkConfig::new("ftp://host/"),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn test_api_key_becomes_header() {
        let config = SdkConfig::localhost().unwrap().with_api_key("secret");
        let hub = config.hub_client_config().unwrap();
        assert_eq!(
            hub.headers,
            vec![("x-api-key".to_string(), "secret".to_string())]
        );
        assert_eq!(hub.url, "ws://127.0.0.1:7095/hub");
    }
}
