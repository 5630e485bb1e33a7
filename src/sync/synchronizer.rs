//! Background synchronization of the configuration snapshot.
//!
//! # States
//! ```text
//! Uninitialized --initialize()--> Running (always, even if the first fetch fails)
//! Running --tick--> fetch --Updated--> merge
//!                         --Unchanged/Failed--> keep last-known-good
//! ```
//!
//! # Design Decisions
//! - One task, one fetch in flight: merges land in completion order
//! - Each iteration is isolated; an error or panic is logged and the loop goes on
//! - Missed ticks are delayed, never bunched up

use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;
use crate::sync::fetcher::{ConfigSource, FetchResult};
use crate::sync::snapshot::{ConfigHandle, ConfigStore, IgnoreReason, MergeReport};

/// Result of one synchronization iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A document was fetched and merged; `changes` keys actually changed.
    Merged { changes: usize },
    Unchanged,
    Failed,
}

/// Poll counters shared with the health endpoint.
#[derive(Debug, Default)]
pub struct SyncStats {
    successful: AtomicU64,
    unchanged: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU64,
    last_success_unix: AtomicU64,
}

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub successful_fetches: u64,
    pub unchanged_fetches: u64,
    pub failed_fetches: u64,
    pub consecutive_failures: u64,
    pub last_success_unix: Option<u64>,
}

impl SyncStats {
    fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_success_unix.store(now, Ordering::Relaxed);
    }

    fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> SyncReport {
        let last = self.last_success_unix.load(Ordering::Relaxed);
        SyncReport {
            successful_fetches: self.successful.load(Ordering::Relaxed),
            unchanged_fetches: self.unchanged.load(Ordering::Relaxed),
            failed_fetches: self.failed.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_success_unix: (last > 0).then_some(last),
        }
    }
}

/// Shortest period the polling loop will run at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Keeps a [`ConfigStore`] converged with a remote [`ConfigSource`].
pub struct ConfigSynchronizer<S> {
    source: S,
    store: ConfigStore,
    interval: Duration,
    stats: Arc<SyncStats>,
}

impl<S: ConfigSource> ConfigSynchronizer<S> {
    pub fn new(source: S, store: ConfigStore, interval: Duration) -> Self {
        // tokio::time::interval panics on a zero period.
        let interval = if interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                requested_ms = interval.as_millis() as u64,
                used_ms = MIN_POLL_INTERVAL.as_millis() as u64,
                "Poll interval too short, clamping"
            );
            MIN_POLL_INTERVAL
        } else {
            interval
        };
        Self {
            source,
            store,
            interval,
            stats: Arc::new(SyncStats::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Read-only accessor for request handlers.
    pub fn handle(&self) -> ConfigHandle {
        self.store.handle()
    }

    pub fn stats(&self) -> Arc<SyncStats> {
        self.stats.clone()
    }

    /// Run the initial fetch, then move the polling loop onto its own task.
    ///
    /// Returns once the first fetch has completed, whatever its outcome.
    pub async fn start(self) -> (ConfigHandle, Arc<SyncStats>, JoinHandle<()>) {
        self.initialize().await;

        let handle = self.handle();
        let stats = self.stats();
        let task = tokio::spawn(self.run());

        tracing::info!("Configuration updater task started");
        (handle, stats, task)
    }

    /// One synchronous fetch before traffic is accepted. Failure keeps the defaults.
    pub async fn initialize(&self) -> SyncOutcome {
        tracing::info!("Initializing application configuration");

        let outcome = self.guarded_sync().await;
        match outcome {
            SyncOutcome::Merged { .. } => tracing::info!(
                revision = self.store.snapshot().revision(),
                "Initial configuration loaded"
            ),
            SyncOutcome::Unchanged | SyncOutcome::Failed => {
                tracing::warn!("Could not fetch initial configuration, using defaults")
            }
        }
        outcome
    }

    /// Poll forever at the fixed interval. Only ends when the task is dropped.
    pub async fn run(self) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            "Configuration synchronizer running"
        );

        loop {
            ticker.tick().await;
            self.guarded_sync().await;
        }
    }

    /// One iteration with panics contained.
    async fn guarded_sync(&self) -> SyncOutcome {
        match AssertUnwindSafe(self.sync_once()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                tracing::error!(
                    panic = %panic_message(panic.as_ref()),
                    "Configuration sync iteration panicked"
                );
                self.stats.record_failure();
                metrics::record_fetch("panic", None);
                SyncOutcome::Failed
            }
        }
    }

    /// Fetch once and apply the result.
    pub async fn sync_once(&self) -> SyncOutcome {
        let started = Instant::now();
        let result = self.source.fetch().await;
        metrics::record_fetch(result.label(), Some(started.elapsed()));

        match result {
            FetchResult::Updated(document) => {
                let report = self.store.merge(&document);
                self.stats.record_success();
                self.log_merge(&report);
                SyncOutcome::Merged {
                    changes: report.changes.len(),
                }
            }
            FetchResult::Unchanged => {
                tracing::debug!("Configuration not modified");
                self.stats.record_unchanged();
                SyncOutcome::Unchanged
            }
            FetchResult::Failed(e) => {
                tracing::error!(
                    error = %e,
                    kind = e.kind(),
                    "Failed to fetch configuration from agent, keeping last-known-good"
                );
                self.stats.record_failure();
                SyncOutcome::Failed
            }
        }
    }

    fn log_merge(&self, report: &MergeReport) {
        for ignored in &report.ignored {
            match ignored.reason {
                IgnoreReason::Unknown => {
                    tracing::debug!(key = %ignored.key, "Ignoring unknown configuration key")
                }
                _ => tracing::warn!(
                    key = %ignored.key,
                    reason = %ignored.reason,
                    "Ignoring configuration value"
                ),
            }
        }

        for change in &report.changes {
            tracing::info!(
                key = %change.key,
                old = %change.old.as_ref().map(ToString::to_string).unwrap_or_else(|| "<unset>".into()),
                new = %change.new,
                "Configuration value changed"
            );
        }

        if !report.changes.is_empty() {
            let snapshot = self.store.snapshot();
            metrics::record_snapshot_revision(snapshot.revision());
            tracing::info!(
                revision = snapshot.revision(),
                changed = report.changes.len(),
                "Configuration updated"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::fetcher::FetchError;
    use crate::sync::snapshot::{ConfigSchema, ConfigValue, UnknownKeyPolicy, FEATURE_X_ENABLED};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    enum Step {
        Updated(Value),
        Unchanged,
        Failed,
        Panic,
    }

    /// Replays a fixed list of outcomes, then reports `Unchanged`.
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ConfigSource for ScriptedSource {
        fn fetch(&self) -> impl Future<Output = FetchResult> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            async move {
                match step {
                    Some(Step::Updated(Value::Object(doc))) => FetchResult::Updated(doc),
                    Some(Step::Updated(other)) => panic!("scripted document must be an object: {}", other),
                    Some(Step::Failed) => FetchResult::Failed(FetchError::Upstream {
                        status: 503,
                        body: "agent unavailable".into(),
                    }),
                    Some(Step::Panic) => panic!("scripted panic"),
                    Some(Step::Unchanged) | None => FetchResult::Unchanged,
                }
            }
        }
    }

    fn synchronizer(
        source: Arc<ScriptedSource>,
        schema: ConfigSchema,
    ) -> ConfigSynchronizer<Arc<ScriptedSource>> {
        ConfigSynchronizer::new(
            source,
            ConfigStore::new(schema, UnknownKeyPolicy::Ignore),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_updated_merges_partially() {
        let schema = ConfigSchema::empty().with_key("a", 1).with_key("b", 2);
        let sync = synchronizer(ScriptedSource::new(vec![Step::Updated(json!({ "b": 3 }))]), schema);

        let outcome = sync.sync_once().await;

        assert_eq!(outcome, SyncOutcome::Merged { changes: 1 });
        let snapshot = sync.handle().snapshot();
        assert_eq!(snapshot.get("a"), Some(&ConfigValue::from(1)));
        assert_eq!(snapshot.get("b"), Some(&ConfigValue::from(3)));
    }

    #[tokio::test]
    async fn test_unchanged_is_noop() {
        let sync = synchronizer(
            ScriptedSource::new(vec![Step::Updated(json!({ "featureXEnabled": true })), Step::Unchanged]),
            ConfigSchema::default(),
        );
        sync.sync_once().await;
        let before = sync.handle().snapshot();

        assert_eq!(sync.sync_once().await, SyncOutcome::Unchanged);

        let after = sync.handle().snapshot();
        assert_eq!(*before, *after);
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_failure_is_noop() {
        let sync = synchronizer(
            ScriptedSource::new(vec![Step::Updated(json!({ "featureXEnabled": true })), Step::Failed]),
            ConfigSchema::default(),
        );
        sync.sync_once().await;
        let before = sync.handle().snapshot();

        assert_eq!(sync.sync_once().await, SyncOutcome::Failed);

        assert_eq!(*before, *sync.handle().snapshot());
        let report = sync.stats().report();
        assert_eq!(report.failed_fetches, 1);
        assert_eq!(report.consecutive_failures, 1);
        assert_eq!(report.successful_fetches, 1);
    }

    #[tokio::test]
    async fn test_defaults_kept_when_first_fetch_fails() {
        let source = ScriptedSource::new(vec![Step::Failed]);
        let sync = synchronizer(source.clone(), ConfigSchema::default());

        let (handle, stats, task) = sync.start().await;

        assert_eq!(source.calls(), 1);
        assert_eq!(*handle.snapshot(), crate::sync::snapshot::ConfigSnapshot::from_schema(&ConfigSchema::default()));
        assert_eq!(stats.report().last_success_unix, None);
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn test_initialize_survives_panic() {
        let sync = synchronizer(ScriptedSource::new(vec![Step::Panic]), ConfigSchema::default());

        assert_eq!(sync.initialize().await, SyncOutcome::Failed);
        assert_eq!(sync.handle().revision(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failures_and_panics() {
        let source = ScriptedSource::new(vec![
            Step::Failed,
            Step::Panic,
            Step::Updated(json!({ "featureXEnabled": true })),
        ]);
        let sync = synchronizer(source.clone(), ConfigSchema::default());
        let handle = sync.handle();
        let stats = sync.stats();

        let task = tokio::spawn(sync.run());

        // Nothing happens before the first interval elapses.
        time::sleep(Duration::from_secs(29)).await;
        assert_eq!(source.calls(), 0);

        time::sleep(Duration::from_secs(66)).await;
        assert_eq!(source.calls(), 3);
        assert!(handle.is_enabled(FEATURE_X_ENABLED));
        assert_eq!(stats.report().failed_fetches, 2);
        assert_eq!(stats.report().consecutive_failures, 0);
        assert!(!task.is_finished());

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_flips_without_restart() {
        let source = ScriptedSource::new(vec![
            Step::Updated(json!({ "featureXEnabled": false })),
            Step::Updated(json!({ "featureXEnabled": true })),
        ]);
        let sync = synchronizer(source, ConfigSchema::default());

        let (handle, _stats, task) = sync.start().await;
        assert!(!handle.is_enabled(FEATURE_X_ENABLED));

        time::sleep(Duration::from_secs(31)).await;
        assert!(handle.is_enabled(FEATURE_X_ENABLED));

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let source = ScriptedSource::new(Vec::new());
        let sync = ConfigSynchronizer::new(
            source.clone(),
            ConfigStore::new(ConfigSchema::default(), UnknownKeyPolicy::Ignore),
            Duration::ZERO,
        );
        assert_eq!(sync.interval(), MIN_POLL_INTERVAL);

        let task = tokio::spawn(sync.run());
        time::sleep(Duration::from_millis(55)).await;

        assert!(!task.is_finished());
        assert!(source.calls() >= 4);
        task.abort();
    }
}
