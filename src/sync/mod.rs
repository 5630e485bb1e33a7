//! Configuration synchronization subsystem.
//!
//! # Data Flow
//! ```text
//! startup:
//!     synchronizer.rs initialize() → fetcher.rs (one GET) → snapshot.rs merge
//!     → request serving starts
//!
//! every poll interval (background task):
//!     fetcher.rs GET {agent}/applications/{app}/environments/{env}/configurations/{profile}
//!     → Updated   → snapshot.rs merge (writer lock, atomic publish)
//!     → Unchanged → nothing
//!     → Failed    → log, nothing
//!
//! request handlers:
//!     ConfigHandle::snapshot() → Arc<ConfigSnapshot> (lock-free)
//! ```
//!
//! # Design Decisions
//! - Exactly one writer; handlers only ever get a `ConfigHandle`
//! - Transient agent failures degrade to last-known-good, never to a dead task
//! - The snapshot has a fixed schema; unknown keys don't leak in by default

pub mod fetcher;
pub mod snapshot;
pub mod synchronizer;

pub use fetcher::{AgentFetcher, ConfigSource, FetchError, FetchResult, RemoteEndpoint};
pub use snapshot::{ConfigHandle, ConfigSchema, ConfigSnapshot, ConfigStore, ConfigValue, UnknownKeyPolicy};
pub use synchronizer::{ConfigSynchronizer, SyncOutcome, SyncReport, SyncStats};
