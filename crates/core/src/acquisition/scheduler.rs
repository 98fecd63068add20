//! Periodic background runs.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::AcquisitionCoordinator;

impl AcquisitionCoordinator {
    /// Start the periodic job (spawns a background task).
    pub fn start(self: &Arc<Self>) {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            warn!("Acquisition scheduler already running");
            return;
        }

        let coordinator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval_secs = self.config.interval_secs.max(1);

        tokio::spawn(async move {
            info!(interval_secs, "Acquisition scheduler started");
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Acquisition scheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !coordinator.scheduled.load(Ordering::Relaxed) {
                            break;
                        }
                        // Own task, so a panic ends this run and not the loop.
                        let job = Arc::clone(&coordinator);
                        match tokio::spawn(async move { job.run().await }).await {
                            Ok(result) if !result.ok => {
                                warn!(message = %result.message, "Scheduled acquisition run failed");
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "Scheduled acquisition run panicked"),
                        }
                    }
                }
            }
            info!("Acquisition scheduler stopped");
        });
    }

    /// Stop the periodic job. A run in progress finishes on its own.
    pub fn stop(&self) {
        if !self.scheduled.swap(false, Ordering::SeqCst) {
            warn!("Acquisition scheduler not running");
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Relaxed)
    }
}
