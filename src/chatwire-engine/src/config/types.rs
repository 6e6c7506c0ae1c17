//! Configuration types.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Agent endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/chat/stream";

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// User-Agent string for outbound requests.
pub const USER_AGENT: &str = concat!("chatwire/", env!("CARGO_PKG_VERSION"));

/// Client configuration, as read from `config.toml`.
///
/// ```toml
/// endpoint = "http://localhost:8000/chat/stream"
/// connect_timeout_secs = 10
/// idle_timeout_secs = 120
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatwireConfig {
    /// Chat-streaming endpoint URL.
    pub endpoint: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Abort a stream that delivers no bytes for this long. Disabled when unset.
    pub idle_timeout_secs: Option<u64>,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for ChatwireConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: None,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl ChatwireConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Parsed endpoint URL.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ChatError::invalid_config("endpoint", format!("{}: {e}", self.endpoint)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ChatError::invalid_config(
                "endpoint",
                format!("unsupported scheme `{scheme}`"),
            )),
        }
    }

    /// Check field values after all sources are merged.
    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;
        if self.connect_timeout_secs == 0 {
            return Err(ChatError::invalid_config(
                "connect_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.idle_timeout_secs == Some(0) {
            return Err(ChatError::invalid_config(
                "idle_timeout_secs",
                "must be greater than zero, omit it to disable",
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ChatError::invalid_config("user_agent", "must not be empty"));
        }
        Ok(())
    }
}

/// Values supplied on the command line. `None` leaves the lower layer as is.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<std::path::PathBuf>,
    pub endpoint: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    pub(crate) fn apply(&self, config: &mut ChatwireConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout_secs = Some(secs);
        }
    }
}
