use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    groups_flushed: AtomicU64,
    actions_batched: AtomicU64,
    actions_translated: AtomicU64,
    actions_deferred: AtomicU64,
    actions_skipped: AtomicU64,
    conflicts_raised: AtomicU64,
    commands_processed: AtomicU64,
    groups_migrated: AtomicU64,
}

impl Telemetry {
    pub fn record_group_flushed(&self, actions: u64) {
        self.groups_flushed.fetch_add(1, Ordering::Relaxed);
        self.actions_batched.fetch_add(actions, Ordering::Relaxed);
    }

    pub fn record_actions_translated(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.actions_translated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_action_deferred(&self) {
        self.actions_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_skipped(&self) {
        self.actions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts_raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group_migrated(&self) {
        self.groups_migrated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn groups_flushed(&self) -> u64 {
        self.groups_flushed.load(Ordering::Relaxed)
    }

    pub fn conflicts_raised(&self) -> u64 {
        self.conflicts_raised.load(Ordering::Relaxed)
    }

    pub fn commands_processed(&self) -> u64 {
        self.commands_processed.load(Ordering::Relaxed)
    }

    pub fn groups_migrated(&self) -> u64 {
        self.groups_migrated.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            groups_flushed: self.groups_flushed.load(Ordering::Relaxed),
            actions_batched: self.actions_batched.load(Ordering::Relaxed),
            actions_translated: self.actions_translated.load(Ordering::Relaxed),
            actions_deferred: self.actions_deferred.load(Ordering::Relaxed),
            actions_skipped: self.actions_skipped.load(Ordering::Relaxed),
            conflicts_raised: self.conflicts_raised.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            groups_migrated: self.groups_migrated.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub groups_flushed: u64,
    pub actions_batched: u64,
    pub actions_translated: u64,
    pub actions_deferred: u64,
    pub actions_skipped: u64,
    pub conflicts_raised: u64,
    pub commands_processed: u64,
    pub groups_migrated: u64,
}

/// Spawns a background task that periodically logs batching, translation,
/// and migration throughput.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "syncbridge::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let translated_delta = current
                        .actions_translated
                        .saturating_sub(last_snapshot.actions_translated);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        translated_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "syncbridge::metrics",
                        throughput = format!("{throughput:.2}"),
                        groups_flushed = current.groups_flushed,
                        actions_batched = current.actions_batched,
                        actions_translated = current.actions_translated,
                        actions_deferred = current.actions_deferred,
                        actions_skipped = current.actions_skipped,
                        conflicts_raised = current.conflicts_raised,
                        commands_processed = current.commands_processed,
                        groups_migrated = current.groups_migrated,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn telemetry_records_counters() {
        let telemetry = Telemetry::default();
        telemetry.record_group_flushed(3);
        telemetry.record_actions_translated(2);
        telemetry.record_action_deferred();
        telemetry.record_action_skipped();
        telemetry.record_conflict();
        telemetry.record_command_processed();
        telemetry.record_group_migrated();

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.groups_flushed, 1);
        assert_eq!(snapshot.actions_batched, 3);
        assert_eq!(snapshot.actions_translated, 2);
        assert_eq!(snapshot.actions_deferred, 1);
        assert_eq!(snapshot.actions_skipped, 1);
        assert_eq!(snapshot.conflicts_raised, 1);
        assert_eq!(snapshot.commands_processed, 1);
        assert_eq!(snapshot.groups_migrated, 1);
    }

    #[tokio::test]
    async fn metrics_reporter_logs_until_shutdown() {
        let telemetry = Arc::new(Telemetry::default());
        telemetry.record_actions_translated(10);

        let shutdown = CancellationToken::new();
        let handle =
            spawn_metrics_reporter(telemetry, shutdown.clone(), Duration::from_millis(10));

        shutdown.cancel();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter should stop promptly")
            .expect("task should not panic");
    }
}
