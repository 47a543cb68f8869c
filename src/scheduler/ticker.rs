// Periodic sweep ticker
// Fires a sweep every interval until stopped or shutdown is broadcast

use super::UpdateExecutor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

pub struct SweepTicker {
    executor: Arc<UpdateExecutor>,
    interval: Duration,
    running: Arc<AtomicBool>,
    sweeps: Arc<AtomicU64>,
}

impl SweepTicker {
    pub fn new(executor: Arc<UpdateExecutor>, interval: Duration) -> Self {
        Self {
            executor,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            sweeps: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the ticker loop. The immediate first tick is skipped.
    #[instrument(skip(self, shutdown), fields(interval_secs = self.interval.as_secs()))]
    pub fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::Relaxed) {
            warn!("Sweep ticker already running");
            return None;
        }

        info!("Starting sweep ticker");

        let executor = self.executor.clone();
        let running = self.running.clone();
        let sweeps = self.sweeps.clone();
        let period = self.interval;

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            while running.load(Ordering::Relaxed) {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.recv() => {
                        info!("Sweep ticker received shutdown");
                        break;
                    }
                }

                if !running.load(Ordering::Relaxed) {
                    break;
                }

                match executor.run_sweep().await {
                    Ok(report) => {
                        sweeps.fetch_add(1, Ordering::Relaxed);
                        info!(failed = report.failed.len(), "Scheduled sweep finished");
                    }
                    Err(e) => error!(error = %e, "Scheduled sweep failed"),
                }
            }

            running.store(false, Ordering::Relaxed);
            info!("Sweep ticker stopped");
        }))
    }

    /// Stop after the current tick
    pub fn stop(&self) {
        info!("Stopping sweep ticker");
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Number of sweeps completed since start
    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }
}
