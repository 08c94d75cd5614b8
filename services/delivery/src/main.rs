//! dmp delivery worker
//!
//! Serves device long-polls for queued actions: evaluates what to deliver,
//! resend, expire, or hold, and writes status transitions back through a
//! serialized update queue.

use std::sync::Arc;

use anyhow::Result;
use dmp_delivery::{
    api, config,
    db::Database,
    handler::PollHandler,
    heartbeat::run_heartbeat_loop,
    longpoll::LongPollCoordinator,
    queue::update_queue,
    state::AppState,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to DMP_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting dmp delivery worker");
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    // Connect to the store; worker state is only constructed once this
    // succeeds.
    let db = match Database::connect(&config.database).await {
        Ok(db) => {
            info!("Store connection established");
            db
        }
        Err(e) => {
            error!(error = %e, "Failed to connect to store");
            return Err(e.into());
        }
    };

    // Run migrations in dev mode
    if config.dev_mode {
        info!("Running store migrations (dev mode)");
        if let Err(e) = db.run_migrations().await {
            error!(error = %e, "Failed to run migrations");
            return Err(e.into());
        }
    }

    let store = Arc::new(db.store());

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the update queue drain worker in background
    let (queue, drain_worker) = update_queue(store.clone(), config.drain_grace);
    let drain_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            drain_worker.run(shutdown_rx).await;
        }
    });

    // Start the heartbeat worker in background
    let heartbeat_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        let store = store.clone();
        let process_name = config.process_name.clone();
        let server_name = config.server_name.clone();
        let interval = config.heartbeat_interval;
        async move {
            run_heartbeat_loop(store, process_name, server_name, interval, shutdown_rx).await;
        }
    });

    // Create application state
    let coordinator = LongPollCoordinator::new(store.clone(), queue);
    let handler = PollHandler::new(store.clone(), coordinator);
    let state = AppState::new(handler, store);

    // Build and run the server
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for poll requests");

    // Spawn the server with graceful shutdown; in-flight long polls finish,
    // new ones are refused.
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for a termination signal
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    // Signal shutdown to all workers; the drain worker applies queued
    // updates within its grace period before exiting.
    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = config.drain_grace + std::time::Duration::from_secs(5);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, drain_handle).await {
        warn!(error = %e, "Drain worker did not shut down in time");
    }

    if let Err(e) = tokio::time::timeout(shutdown_timeout, heartbeat_handle).await {
        warn!(error = %e, "Heartbeat worker did not shut down in time");
    }

    info!("Delivery worker shutdown complete");
    Ok(())
}

/// Resolve on SIGTERM or ctrl-c.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
