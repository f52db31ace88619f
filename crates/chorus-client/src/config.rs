//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration against a local backend.  Configuration is read once at
//! startup; nothing re-reads the environment afterwards.

use std::time::Duration;

use chorus_shared::constants::{
    DEFAULT_DEBOUNCE_MS, DEFAULT_PAGE_SIZE, DEFAULT_RECONNECT_DELAY_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    /// Env: `CHORUS_API_URL`
    /// Default: `http://localhost:8080`
    pub api_base_url: String,

    /// URL of the realtime push channel.
    /// Env: `CHORUS_SOCKET_URL`
    /// Default: `ws://localhost:8080/socket`
    pub socket_url: String,

    /// Number of messages requested per history page.
    /// Env: `CHORUS_PAGE_SIZE`
    pub page_size: u32,

    /// Fixed delay between realtime reconnect attempts.
    /// Env: `CHORUS_RECONNECT_DELAY_SECS`
    pub reconnect_delay: Duration,

    /// Debounce window for search and availability lookups.
    /// Env: `CHORUS_DEBOUNCE_MS`
    pub debounce_interval: Duration,

    /// Per-request HTTP timeout.
    /// Env: `CHORUS_REQUEST_TIMEOUT_SECS`
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            socket_url: "ws://localhost:8080/socket".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            debounce_interval: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CHORUS_API_URL") {
            config.api_base_url = url;
        }

        if let Ok(url) = std::env::var("CHORUS_SOCKET_URL") {
            config.socket_url = url;
        }

        if let Ok(val) = std::env::var("CHORUS_PAGE_SIZE") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => tracing::warn!(value = %val, "Invalid CHORUS_PAGE_SIZE, using default"),
            }
        }

        if let Ok(val) = std::env::var("CHORUS_RECONNECT_DELAY_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.reconnect_delay = Duration::from_secs(n),
                _ => {
                    tracing::warn!(value = %val, "Invalid CHORUS_RECONNECT_DELAY_SECS, using default")
                }
            }
        }

        if let Ok(val) = std::env::var("CHORUS_DEBOUNCE_MS") {
            match val.parse::<u64>() {
                Ok(n) => config.debounce_interval = Duration::from_millis(n),
                _ => tracing::warn!(value = %val, "Invalid CHORUS_DEBOUNCE_MS, using default"),
            }
        }

        if let Ok(val) = std::env::var("CHORUS_REQUEST_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.request_timeout = Duration::from_secs(n),
                _ => {
                    tracing::warn!(value = %val, "Invalid CHORUS_REQUEST_TIMEOUT_SECS, using default")
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
