//! Client configuration
//!
//! Only the two base URLs are environment-facing; everything else has a
//! sensible default and can be overridden through the builder methods or a
//! TOML document.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the REST base URL
pub const API_URL_ENV: &str = "AGENTVIEW_API_URL";
/// Environment variable holding the push channel base URL
pub const WS_URL_ENV: &str = "AGENTVIEW_WS_URL";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL for REST calls
    pub api_base_url: String,
    /// Base URL for the push channel
    pub ws_base_url: String,
    /// Per-request timeout
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Cache time-to-live
    #[serde(with = "duration_ms")]
    pub cache_ttl: Duration,
    /// Maximum number of cache entries; unbounded when unset
    ///
    /// A bound lets the cache evict live entries under pressure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<u64>,
    /// Status poll interval when the push channel is unavailable
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Root/orchestrator agent that spawns the others
    pub root_agent_id: String,
}

impl ClientConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `AGENTVIEW_API_URL` / `AGENTVIEW_WS_URL`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(API_URL_ENV) {
            config.api_base_url = url;
        }
        if let Ok(url) = std::env::var(WS_URL_ENV) {
            config.ws_base_url = url;
        }
        config
    }

    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    /// - `ClientError::Config` if the document is malformed or invalid
    pub fn from_toml_str(source: &str) -> Result<Self, ClientError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check URL schemes and non-zero durations
    ///
    /// # Errors
    /// - `ClientError::Config` describing the first invalid field
    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(ClientError::Config(format!(
                "api_base_url must be http(s): {:?}",
                self.api_base_url
            )));
        }
        if !(self.ws_base_url.starts_with("ws://") || self.ws_base_url.starts_with("wss://")) {
            return Err(ClientError::Config(format!(
                "ws_base_url must be ws(s): {:?}",
                self.ws_base_url
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ClientError::Config("poll_interval must be non-zero".to_string()));
        }
        if self.root_agent_id.is_empty() {
            return Err(ClientError::Config("root_agent_id must be set".to_string()));
        }
        Ok(())
    }

    /// With REST base URL
    #[inline]
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// With push channel base URL
    #[inline]
    #[must_use]
    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = url.into();
        self
    }

    /// With cache TTL
    #[inline]
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// With a bound on the number of cache entries
    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// With poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// With root agent id
    #[inline]
    #[must_use]
    pub fn with_root_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.root_agent_id = agent_id.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            ws_base_url: "ws://localhost:8000/ws".to_string(),
            request_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(30),
            cache_capacity: None,
            poll_interval: Duration::from_secs(2),
            root_agent_id: "orchestrator".to_string(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        s.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
