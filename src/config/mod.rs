//! Service configuration subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (APPCONFIG_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable for the process lifetime)
//! ```
//!
//! # Design Decisions
//! - Resolved once at startup; runtime feature values come from the agent, not from here
//! - All fields have defaults to allow running with no file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AgentConfig;
pub use schema::FeatureConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ServiceConfig;
