//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the agent client from validated settings
//! - Run the initial configuration fetch before traffic is accepted
//! - Start the background polling task
//!
//! # Design Decisions
//! - A bad agent URL is fatal; an unreachable agent is not
//! - Listeners start after this returns (traffic only when config is initialized)

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::sync::fetcher::FetcherInitError;
use crate::sync::{AgentFetcher, ConfigHandle, ConfigSchema, ConfigStore, ConfigSynchronizer, SyncStats};

/// Running configuration synchronization.
pub struct SyncRuntime {
    pub handle: ConfigHandle,
    pub stats: Arc<SyncStats>,
    pub task: JoinHandle<()>,
}

/// Compiled-in schema plus the configured gate key, declared as a flag
/// defaulting to off so merges never drop it as unknown.
pub fn service_schema(config: &ServiceConfig) -> ConfigSchema {
    let schema = ConfigSchema::default();
    let gate_key = config.features.users_gate_key.as_str();
    if schema.kind_of(gate_key).is_some() {
        schema
    } else {
        schema.with_key(gate_key, false)
    }
}

/// Initialize configuration from the agent and spawn the polling loop.
pub async fn start_sync(config: &ServiceConfig) -> Result<SyncRuntime, FetcherInitError> {
    let agent = &config.agent;
    let fetcher = AgentFetcher::new(&agent.base_url, &agent.endpoint(), agent.timeout())?;

    tracing::info!(
        url = %fetcher.url(),
        interval_secs = agent.poll_interval_secs,
        timeout_secs = agent.timeout_secs,
        "Configuration agent endpoint resolved"
    );

    let store = ConfigStore::new(service_schema(config), agent.unknown_key_policy());
    let synchronizer = ConfigSynchronizer::new(fetcher, store, agent.poll_interval());
    let (handle, stats, task) = synchronizer.start().await;

    Ok(SyncRuntime {
        handle,
        stats,
        task,
    })
}
