//! Service configuration schema.
//!
//! These are the process settings (where to listen, which agent to poll),
//! not the feature configuration served by the agent.
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sync::fetcher::RemoteEndpoint;
use crate::sync::snapshot::{UnknownKeyPolicy, FEATURE_X_ENABLED};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Inbound HTTP listener.
    pub listener: ListenerConfig,

    /// Configuration agent to poll.
    pub agent: AgentConfig,

    /// Feature gate wiring for request handlers.
    pub features: FeatureConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Configuration agent settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the agent sidecar.
    pub base_url: String,

    /// Application name.
    pub application: String,

    /// Environment name.
    pub environment: String,

    /// Configuration profile name.
    pub profile: String,

    /// Delay between polls in seconds.
    pub poll_interval_secs: u64,

    /// Per-fetch timeout in seconds.
    pub timeout_secs: u64,

    /// Adopt keys that are not part of the compiled-in schema.
    pub adopt_unknown_keys: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:2772".to_string(),
            application: "myapp".to_string(),
            environment: "prod".to_string(),
            profile: "app-config".to_string(),
            poll_interval_secs: 30,
            timeout_secs: 5,
            adopt_unknown_keys: false,
        }
    }
}

impl AgentConfig {
    pub fn endpoint(&self) -> RemoteEndpoint {
        RemoteEndpoint {
            application: self.application.clone(),
            environment: self.environment.clone(),
            profile: self.profile.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn unknown_key_policy(&self) -> UnknownKeyPolicy {
        if self.adopt_unknown_keys {
            UnknownKeyPolicy::Adopt
        } else {
            UnknownKeyPolicy::Ignore
        }
    }
}

/// Feature gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Boolean key that gates `GET /users`.
    pub users_gate_key: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            users_gate_key: FEATURE_X_ENABLED.to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    pub log_filter: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "appconfig_gate=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
