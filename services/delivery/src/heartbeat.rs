//! Heartbeat loop for liveness reporting.
//!
//! The worker upserts a liveness record on a fixed period so an operations
//! collector can tell it is alive. The period is unrelated to poll cycles,
//! and a failed beat never affects request handling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::db::OpsStore;
use crate::model::now_ms;

/// Run the heartbeat loop until shutdown.
pub async fn run_heartbeat_loop(
    store: Arc<dyn OpsStore>,
    process_name: String,
    server_name: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        process_name = %process_name,
        server_name = %server_name,
        interval_secs = interval.as_secs(),
        "Starting heartbeat loop"
    );

    let mut consecutive_failures = 0u32;
    let mut interval_timer = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                match store.record_heartbeat(&process_name, &server_name, now_ms()).await {
                    Ok(()) => {
                        consecutive_failures = 0;
                        debug!("Heartbeat recorded");
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        if consecutive_failures <= 3 {
                            warn!(
                                error = %e,
                                consecutive_failures,
                                "Heartbeat failed"
                            );
                        } else {
                            error!(
                                error = %e,
                                consecutive_failures,
                                "Heartbeat failed repeatedly"
                            );
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Heartbeat loop shutting down");
                    break;
                }
            }
        }
    }
}
