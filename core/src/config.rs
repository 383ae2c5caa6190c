//! Client configuration.
//!
//! `ClientConfig` is fixed at client construction. It can be deserialized
//! (every field defaults) or read from `MIRAGE_HTTP_*` environment
//! variables; unparsable values are logged and ignored.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::http::LogOptions;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const ENV_TIMEOUT_SECS: &str = "MIRAGE_HTTP_TIMEOUT_SECS";
pub const ENV_USER_AGENT: &str = "MIRAGE_HTTP_USER_AGENT";
pub const ENV_LOG: &str = "MIRAGE_HTTP_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-request timeout in milliseconds; 0 is read as 1.
    pub timeout_ms: u64,
    pub user_agent: Option<String>,
    pub log_options: LogOptions,
    pub pretty_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: Some(concat!("mirage-core/", env!("CARGO_PKG_VERSION")).to_string()),
            log_options: LogOptions::SUMMARY,
            pretty_json: false,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    /// Millisecond precision; anything shorter rounds up to 1 ms.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.timeout_ms = millis.max(1);
        self
    }

    pub fn with_log_options(mut self, options: LogOptions) -> Self {
        self.log_options = options;
        self
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the
    /// `MIRAGE_HTTP_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout_ms = secs.saturating_mul(1000),
                _ => warn!(key = ENV_TIMEOUT_SECS, value = %raw, "ignoring invalid timeout"),
            }
        }
        if let Some(agent) = lookup(ENV_USER_AGENT) {
            config.user_agent = Some(agent).filter(|agent| !agent.is_empty());
        }
        if let Some(raw) = lookup(ENV_LOG) {
            match LogOptions::from_name(&raw) {
                Some(options) => config.log_options = options,
                None => warn!(key = ENV_LOG, value = %raw, "ignoring unknown log level"),
            }
        }
        config
    }
}
