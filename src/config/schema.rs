//! Configuration schema definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the observer demo service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObserverConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Outbound call made by the demo endpoints.
    pub upstream: UpstreamConfig,

    /// Request correlator settings.
    pub correlator: CorrelatorConfig,

    /// Logging, observer output and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:5000").
    pub bind_address: String,

    /// Server-side request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// The outbound resource the demo endpoints proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// URL returning a single todo item as JSON.
    pub todo_url: String,

    /// Outbound request timeout in seconds.
    pub timeout_secs: u64,

    /// User-Agent header sent with outbound requests.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            todo_url: "https://jsonplaceholder.typicode.com/todos/1".to_string(),
            timeout_secs: 10,
            user_agent: concat!("http-observers/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Request correlator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Start records older than this are dropped if no stop arrived.
    pub stale_after_secs: u64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 300,
        }
    }
}

impl CorrelatorConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Where observer lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Plain lines on stdout.
    #[default]
    Console,
    /// `info` events through the tracing subscriber.
    Tracing,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Destination for observer lines.
    pub output: OutputMode,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            output: OutputMode::Console,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
