//! Feature-gated HTTP service driven by an AppConfig-style configuration agent.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod sync;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use sync::{ConfigHandle, ConfigSynchronizer};
