//! Periodic reconciliation scheduler.
//!
//! Runs a cycle at startup, every `interval`, and whenever a config change
//! event arrives (file watcher or manual trigger).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::gitops::reconciler::ConfigReconciler;
use crate::gitops::watcher::ConfigChangeEvent;

/// Periodic sync scheduler using the reconciler.
pub struct SyncScheduler {
    reconciler: Arc<ConfigReconciler>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl SyncScheduler {
    /// Creates a new sync scheduler.
    pub fn new(reconciler: Arc<ConfigReconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares the shutdown flag, e.g. with a signal handler.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Start the sync loop in a background thread.
    /// Accepts a trigger receiver for change events and manual sync requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<ConfigChangeEvent>) -> JoinHandle<()> {
        let reconciler = Arc::clone(&self.reconciler);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to start scheduler runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                // First tick completes immediately: reconcile at startup.
                let mut interval_timer = tokio::time::interval(interval);
                interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // Wakes the select below so shutdown is seen without waiting a full interval.
                let mut shutdown_poll = tokio::time::interval(Duration::from_millis(100));
                let mut triggers_open = true;

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        event = trigger_rx.recv(), if triggers_open => match event {
                            Ok(event) => {
                                log::info!("Sync triggered: {}", event);
                                // Coalesce a burst of events into one cycle.
                                while trigger_rx.try_recv().is_ok() {}
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                log::debug!("Coalesced {} change event(s)", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                log::debug!("Trigger channel closed; continuing on interval only");
                                triggers_open = false;
                                continue;
                            }
                        },
                        _ = shutdown_poll.tick() => continue,
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    match reconciler.reconcile().await {
                        Ok(report) if report.skipped => {}
                        Ok(report) if report.failed() > 0 => {
                            log::warn!(
                                "Sync cycle finished with {} failed tenant(s)",
                                report.failed()
                            );
                        }
                        Ok(_) => {}
                        Err(e) => log::error!("Sync cycle failed: {}", e),
                    }
                }
            });

            log::info!("Sync scheduler stopped");
        })
    }

    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
