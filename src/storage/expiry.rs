//! Background Expiry Sweeper
//!
//! Lazy expiry (checking on access) keeps reads correct, but a key that expires
//! and is never read again would stay in memory forever. The sweeper bounds
//! that memory by periodically evicting every expired string entry.
//!
//! ## Design
//!
//! Scheduling and eviction are separate:
//! - [`RecurringTask`] is a generic ticker: it runs a closure on a fixed period
//!   on the Tokio runtime until its handle is stopped or dropped.
//! - [`ExpirySweeper`] is a `RecurringTask` whose closure calls
//!   [`StorageEngine::cleanup_expired`]. It knows nothing about the store's
//!   internals and never touches the hash namespace.
//!
//! Correctness never depends on the sweeper having run.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Default period between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Fixed interval between sweeps (default: 1s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// A closure run on a fixed period in a background Tokio task.
///
/// The task stops when [`RecurringTask::stop`] is called or the handle is
/// dropped. Must be created from within a Tokio runtime.
#[derive(Debug)]
pub struct RecurringTask {
    name: &'static str,
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl RecurringTask {
    /// Spawns `tick` to run every `period`, first firing one period from now.
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(),
                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            debug!(task = name, "Recurring task received shutdown signal");
                            return;
                        }
                    }
                }
            }
        });

        Self { name, shutdown_tx }
    }

    /// Stops the task. Called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            debug!(task = self.name, "Recurring task stopped");
        }
    }
}

impl Drop for RecurringTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    task: RecurringTask,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use driftkv::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let task = RecurringTask::spawn("expiry-sweeper", config.interval, move || {
            let expired = engine.cleanup_expired();
            if expired > 0 {
                debug!(
                    expired = expired,
                    keys_remaining = engine.len(),
                    "Expired keys cleaned up"
                );
            } else {
                trace!("Expiry sweep found nothing to evict");
            }
        });

        info!(
            interval_ms = config.interval.as_millis() as u64,
            "Background expiry sweeper started"
        );

        Self { task }
    }

    /// Stops the expiry sweeper.
    pub fn stop(&self) {
        self.task.stop();
    }
}

/// Starts the expiry sweeper with the default one-second period.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}
