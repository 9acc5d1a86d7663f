//! Background expiry sweeper.
//!
//! Wakes every `sweep_interval` and runs [`RoomRegistry::sweep`]. Missed
//! wakeups are skipped rather than replayed, so a stalled runtime never
//! produces a burst of back-to-back sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::RoomRegistry;

/// Handle to a running sweeper task.
///
/// Dropping the handle also stops the task (the stop channel closes).
pub struct SweeperHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the sweeper and waits for the task to exit.
    pub async fn shutdown(self) {
        let Self { stop, task } = self;
        let _ = stop.send(());
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "sweeper task ended abnormally");
        }
    }
}

/// Spawns the sweeper for `registry`, waking every `every`.
///
/// The first pass runs one full interval after spawning.
pub fn spawn_sweeper(
    registry: Arc<RoomRegistry>,
    every: Duration,
) -> SweeperHandle {
    let (stop, stop_rx) = oneshot::channel();
    let task = tokio::spawn(run(registry, every, stop_rx));
    SweeperHandle { stop, task }
}

async fn run(
    registry: Arc<RoomRegistry>,
    every: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    tracing::info!(
        interval_secs = every.as_secs(),
        ttl_secs = registry.config().room_ttl.as_secs(),
        "room sweeper started"
    );

    let mut ticker = time::interval_at(time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let report = registry.sweep().await;
                if report.evicted.is_empty() && report.failed == 0 {
                    tracing::trace!(retained = report.retained, "sweep found nothing to evict");
                } else {
                    tracing::info!(
                        evicted = report.evicted.len(),
                        failed = report.failed,
                        retained = report.retained,
                        "sweep completed"
                    );
                }
            }
        }
    }

    tracing::info!("room sweeper stopped");
}
