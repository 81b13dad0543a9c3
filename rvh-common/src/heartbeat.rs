//! Periodic "still running" log lines for long remote operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::info;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Background ticker that logs while an operation is in progress.
///
/// Stops on [`Heartbeat::stop`] or when dropped. Must be started inside a
/// tokio runtime.
pub struct Heartbeat {
    label: String,
    started: Instant,
    beats: Arc<AtomicU64>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start(label: impl Into<String>, period: Duration) -> Self {
        let label = label.into();
        let started = Instant::now();
        let beats = Arc::new(AtomicU64::new(0));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let label_for_task = label.clone();
        let beats_for_task = Arc::clone(&beats);
        let period = period.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(started + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        beats_for_task.fetch_add(1, Ordering::Relaxed);
                        let elapsed = Duration::from_secs(started.elapsed().as_secs());
                        info!(
                            operation = %label_for_task,
                            elapsed = %humantime::format_duration(elapsed),
                            "still running"
                        );
                    }
                }
            }
        });

        Self {
            label,
            started,
            beats,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of heartbeats logged so far.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop ticking and wait for the background task to exit.
    pub async fn stop(mut self) -> u64 {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.beats()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
