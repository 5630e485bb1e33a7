//! Configuration loading from disk and the environment.
//!
//! Precedence: environment > file > compiled-in defaults.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_APPLICATION: &str = "APPCONFIG_APPLICATION";
pub const ENV_ENVIRONMENT: &str = "APPCONFIG_ENVIRONMENT";
pub const ENV_PROFILE: &str = "APPCONFIG_PROFILE";
pub const ENV_AGENT_URL: &str = "APPCONFIG_AGENT_URL";
pub const ENV_POLL_INTERVAL_SECS: &str = "APPCONFIG_POLL_INTERVAL_SECS";
pub const ENV_BIND_ADDRESS: &str = "BIND_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the process environment, and validate.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply overrides found through `lookup`. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(v) = get(ENV_APPLICATION) {
        config.agent.application = v;
    }
    if let Some(v) = get(ENV_ENVIRONMENT) {
        config.agent.environment = v;
    }
    if let Some(v) = get(ENV_PROFILE) {
        config.agent.profile = v;
    }
    if let Some(v) = get(ENV_AGENT_URL) {
        config.agent.base_url = v;
    }
    if let Some(v) = get(ENV_BIND_ADDRESS) {
        config.listener.bind_address = v;
    }
    if let Some(v) = get(ENV_POLL_INTERVAL_SECS) {
        config.agent.poll_interval_secs = v.trim().parse().map_err(|_| ConfigError::Env {
            var: ENV_POLL_INTERVAL_SECS,
            value: v.clone(),
        })?;
    }

    Ok(())
}
