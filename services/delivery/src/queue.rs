//! Serialized status mutation queue.
//!
//! Evaluation cycles enqueue [`PendingUpdate`]s fire-and-forget; a single
//! drain worker applies them to the store one at a time, in enqueue order.
//! With one drain cursor, no two mutations are ever in flight concurrently,
//! so interleaved "sent" and "resent" transitions for the same action
//! cannot lose updates.
//!
//! Failure policy: a malformed entry is logged and dropped; a store write
//! failure is logged and the entry is dropped with no retry. Draining
//! always continues to the next entry — the affected action's state stays
//! stale until the next poll re-evaluates it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::db::{ActionStore, StoreError};
use crate::model::PendingUpdate;

/// Enqueue handle for the update queue.
///
/// Cloneable and non-blocking; enqueue returns immediately regardless of
/// how far behind the drain worker is.
#[derive(Clone)]
pub struct UpdateQueue {
    tx: mpsc::UnboundedSender<PendingUpdate>,
}

impl UpdateQueue {
    /// Append an update to the queue.
    pub fn enqueue(&self, update: PendingUpdate) {
        if self.tx.send(update).is_err() {
            // Only possible once the drain worker has shut down.
            warn!("Update queue is closed; dropping update");
        }
    }
}

/// The single background drain task.
pub struct DrainWorker {
    rx: mpsc::UnboundedReceiver<PendingUpdate>,
    store: Arc<dyn ActionStore>,

    /// Bounded grace period for draining queued entries at shutdown.
    grace: Duration,
}

/// Create a queue handle and its drain worker.
pub fn update_queue(store: Arc<dyn ActionStore>, grace: Duration) -> (UpdateQueue, DrainWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdateQueue { tx }, DrainWorker { rx, store, grace })
}

impl DrainWorker {
    /// Run the drain loop until shutdown.
    ///
    /// The loop parks on the empty queue and wakes per entry; it never
    /// spins and never blocks an enqueuer.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting update queue drain worker");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.drain_remaining().await;
                        break;
                    }
                }

                update = self.rx.recv() => {
                    match update {
                        Some(update) => self.apply(update).await,
                        None => {
                            debug!("Update queue closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("Update queue drain worker stopped");
    }

    /// Validate and apply one entry. Errors are logged and the entry is
    /// dropped either way.
    async fn apply(&self, update: PendingUpdate) {
        if let Err(e) = update.validate() {
            warn!(
                action_id = %update.action_id,
                error = %e,
                "Dropping malformed queued update"
            );
            return;
        }

        if let Err(e) = self.store.apply_update(&update).await {
            self.log_write_failure(&update, &e);
        }
    }

    fn log_write_failure(&self, update: &PendingUpdate, e: &StoreError) {
        error!(
            action_id = %update.action_id,
            status = update.status.code(),
            error = %e,
            "Dropping queued update after store failure"
        );
    }

    /// Apply already-enqueued entries at shutdown, within the grace period.
    async fn drain_remaining(&mut self) {
        let mut drained = 0usize;
        let deadline = tokio::time::Instant::now() + self.grace;

        while let Ok(update) = self.rx.try_recv() {
            if tokio::time::Instant::now() >= deadline {
                warn!(drained, "Shutdown grace period elapsed with updates remaining");
                return;
            }
            self.apply(update).await;
            drained += 1;
        }

        info!(drained, "Update queue drained for shutdown");
    }
}
