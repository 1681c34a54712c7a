// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment-driven configuration.

use std::env;
use std::sync::Mutex;

use streammaster_sdk::{SdkConfig, SdkError, StreamMasterSdk};

static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "STREAMMASTER_BASE_URL",
    "STREAMMASTER_HUB_PATH",
    "STREAMMASTER_API_KEY",
    "STREAMMASTER_CONNECT_TIMEOUT_MS",
    "STREAMMASTER_KEEP_ALIVE_MS",
    "STREAMMASTER_SERVER_TIMEOUT_MS",
    "STREAMMASTER_RECONNECT_INITIAL_MS",
    "STREAMMASTER_RECONNECT_MAX_MS",
];

/// Restores the touched variables when dropped.
struct EnvGuard {
    vars: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    /// Start from a clean slate for every StreamMaster variable.
    fn clean() -> Self {
        let mut guard = Self { vars: Vec::new() };
        for name in VARS {
            guard.remove(name);
        }
        guard
    }

    fn set(&mut self, key: &str, value: &str) {
        self.vars.push((key.to_string(), env::var(key).ok()));
        // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
        unsafe { env::set_var(key, value) };
    }

    fn remove(&mut self, key: &str) {
        self.vars.push((key.to_string(), env::var(key).ok()));
        // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
        unsafe { env::remove_var(key) };
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.vars.drain(..).rev() {
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe {
                match value {
                    Some(v) => env::set_var(&key, v),
                    None => env::remove_var(&key),
                }
            }
        }
    }
}

#[test]
fn test_from_env_requires_base_url() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let _env = EnvGuard::clean();

    match SdkConfig::from_env() {
        Err(SdkError::Config(message)) => assert!(message.contains("STREAMMASTER_BASE_URL")),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(StreamMasterSdk::from_env().is_err());
}

#[test]
fn test_from_env_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let mut env = EnvGuard::clean();
    env.set("STREAMMASTER_BASE_URL", "http://media.local:7095");

    let config = SdkConfig::from_env().unwrap();
    assert_eq!(config.base_url.as_str(), "http://media.local:7095/");
    assert_eq!(config.hub_path, "hub");
    assert_eq!(config.api_key, None);
    assert_eq!(config.connect_timeout_ms, 10_000);
    assert_eq!(config.keep_alive_interval_ms, 15_000);
    assert_eq!(config.server_timeout_ms, 30_000);
    assert_eq!(config.reconnect_initial_delay_ms, 1_000);
    assert_eq!(config.reconnect_max_delay_ms, 30_000);
    assert_eq!(config.hub_url().unwrap().as_str(), "ws://media.local:7095/hub");
}

#[test]
fn test_from_env_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let mut env = EnvGuard::clean();
    env.set("STREAMMASTER_BASE_URL", "https://tv.example.test/streammaster");
    env.set("STREAMMASTER_HUB_PATH", "signalr/hub");
    env.set("STREAMMASTER_API_KEY", "secret");
    env.set("STREAMMASTER_CONNECT_TIMEOUT_MS", "2500");
    env.set("STREAMMASTER_KEEP_ALIVE_MS", "0");
    env.set("STREAMMASTER_RECONNECT_INITIAL_MS", "250");
    env.set("STREAMMASTER_RECONNECT_MAX_MS", "8000");

    let config = SdkConfig::from_env().unwrap();
    assert_eq!(config.api_key.as_deref(), Some("secret"));
    assert_eq!(config.connect_timeout_ms, 2_500);
    assert_eq!(config.keep_alive_interval_ms, 0);
    assert_eq!(
        config.hub_url().unwrap().as_str(),
        "wss://tv.example.test/streammaster/signalr/hub"
    );
    assert_eq!(
        config.api_url("api/settings/getsettings").unwrap().as_str(),
        "https://tv.example.test/streammaster/api/settings/getsettings"
    );

    let policy = config.reconnect_policy();
    assert_eq!(policy.initial_delay_ms, 250);
    assert_eq!(policy.max_delay_ms, 8_000);

    let hub = config.hub_client_config().unwrap();
    assert_eq!(hub.headers, vec![("x-api-key".to_string(), "secret".to_string())]);
}

#[test]
fn test_from_env_ignores_bad_numbers_and_empty_key() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let mut env = EnvGuard::clean();
    env.set("STREAMMASTER_BASE_URL", "http://127.0.0.1:7095/");
    env.set("STREAMMASTER_API_KEY", "");
    env.set("STREAMMASTER_SERVER_TIMEOUT_MS", "soon");

    let config = SdkConfig::from_env().unwrap();
    assert_eq!(config.api_key, None);
    assert_eq!(config.server_timeout_ms, 30_000);
}

#[test]
fn test_from_env_rejects_non_http_base_url() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let mut env = EnvGuard::clean();
    env.set("STREAMMASTER_BASE_URL", "ftp://media.local");

    assert!(matches!(SdkConfig::from_env(), Err(SdkError::Config(_))));
}
