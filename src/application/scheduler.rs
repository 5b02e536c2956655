use crate::application::engine::ReconciliationEngine;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

/// Runs `reconcile_pending` on a fixed period until asked to stop.
pub struct SweepScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweepScheduler {
    /// Spawns the sweep loop. The first sweep runs after one full `period`.
    pub fn start(engine: ReconciliationEngine, period: Duration, older_than: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.reconcile_pending(older_than).await {
                            Ok(report) => info!(?report, "Scheduled sweep completed"),
                            Err(err) => warn!(error = %err, "Scheduled sweep failed"),
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Sweep scheduler stopped");
        });
        Self { shutdown, handle }
    }

    /// Signals the loop and waits for an in-flight sweep to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "Sweep scheduler task ended abnormally");
        }
    }
}
