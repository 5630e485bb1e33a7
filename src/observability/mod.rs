//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! synchronizer + handlers produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (fetch outcomes, snapshot revision, gate decisions)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape (optional)
//! ```

pub mod logging;
pub mod metrics;
