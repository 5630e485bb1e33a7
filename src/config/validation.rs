//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (interval and timeout > 0)
//! - Check addresses and the agent URL parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::ServiceConfig;
use crate::sync::snapshot::{ConfigSchema, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid address: {value}")]
    BadAddress { field: &'static str, value: String },

    #[error("agent.base_url is not a usable http(s) URL: {0}")]
    BadAgentUrl(String),

    #[error("features.users_gate_key '{key}' names a {kind} setting, not a flag")]
    GateKeyNotFlag { key: String, kind: ValueKind },
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_host_port(&config.listener.bind_address) {
        errors.push(ValidationError::BadAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "listener.request_timeout_secs" });
    }

    let agent = &config.agent;
    match Url::parse(&agent.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(_) => errors.push(ValidationError::BadAgentUrl(agent.base_url.clone())),
        Err(e) => errors.push(ValidationError::BadAgentUrl(format!("{}: {}", agent.base_url, e))),
    }
    for (field, value) in [
        ("agent.application", &agent.application),
        ("agent.environment", &agent.environment),
        ("agent.profile", &agent.profile),
        ("features.users_gate_key", &config.features.users_gate_key),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::Empty { field });
        }
    }
    let gate_key = &config.features.users_gate_key;
    match ConfigSchema::default().kind_of(gate_key) {
        Some(kind) if kind != ValueKind::Bool => errors.push(ValidationError::GateKeyNotFlag {
            key: gate_key.clone(),
            kind,
        }),
        _ => {}
    }
    if agent.poll_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "agent.poll_interval_secs" });
    }
    if agent.timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "agent.timeout_secs" });
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `SocketAddr` or `host:port`, as accepted by `TcpListener::bind`.
fn is_host_port(value: &str) -> bool {
    if value.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match value.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

/// The metrics exporter needs a literal socket address.
fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field,
            value: value.to_string(),
        });
    }
}
