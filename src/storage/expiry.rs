//! Background Expiry Sweeper
//!
//! Lazy expiry already hides elements past their deadline from every lookup,
//! but an element that is never touched again would stay in memory forever.
//! The sweeper removes those.
//!
//! ## Design
//!
//! One Tokio task per shard. Each task:
//! 1. Sleeps for the configured interval (default: 5s)
//! 2. Checks the shard watermark and returns straight to sleep if nothing is due
//! 3. Otherwise locks only its own shard, drops expired elements and
//!    recomputes the watermark
//!
//! All tasks of one database share a single `watch` channel used as the
//! stop signal.

use crate::storage::engine::{now_millis, Database};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Default interval between two sweeps of the same shard.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(5000);

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval between sweeps of one shard
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// A handle to the sweep tasks of one database.
///
/// When this handle is dropped, the tasks are stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Starts one sweep task per shard of `db`.
    ///
    /// Outside a Tokio runtime no task is spawned and the database relies on
    /// lazy expiry alone.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use rapidkv::storage::{Database, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let db = Arc::new(Database::new(0, 32));
    /// let sweeper = ExpirySweeper::start(db, ExpiryConfig::default());
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(db: Arc<Database>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = match Handle::try_current() {
            Ok(runtime) => (0..db.shard_count())
                .map(|shard| {
                    runtime.spawn(sweeper_loop(
                        Arc::clone(&db),
                        shard,
                        config.interval,
                        shutdown_rx.clone(),
                    ))
                })
                .collect(),
            Err(_) => {
                debug!(db = db.index(), "No runtime available, expiry sweeper not started");
                Vec::new()
            }
        };

        debug!(
            db = db.index(),
            shards = tasks.len(),
            interval_ms = config.interval.as_millis() as u64,
            "Expiry sweeper started"
        );

        Self { shutdown_tx, tasks }
    }

    /// Signals every sweep task to exit.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the tasks and waits for them to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The sweep loop of one shard.
async fn sweeper_loop(
    db: Arc<Database>,
    shard: usize,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    trace!(db = db.index(), shard, "Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let expired = db.sweep_shard(shard, now_millis());
        if expired > 0 {
            debug!(db = db.index(), shard, expired, "Expired keys cleaned up");
        }
    }
}
