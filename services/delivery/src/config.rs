use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;

use crate::db::DbConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,

    /// Process identity in heartbeat records.
    pub process_name: String,

    /// Host identity in heartbeat records.
    pub server_name: String,

    pub heartbeat_interval: Duration,

    /// Grace period for draining queued updates at shutdown.
    pub drain_grace: Duration,

    pub database: DbConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("DMP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = std::env::var("DMP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("DMP_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let process_name =
            std::env::var("DMP_PROCESS_NAME").unwrap_or_else(|_| "delivery-worker".to_string());

        let server_name =
            std::env::var("DMP_SERVER_NAME").unwrap_or_else(|_| "localhost".to_string());

        let heartbeat_interval = std::env::var("DMP_HEARTBEAT_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        let drain_grace = std::env::var("DMP_DRAIN_GRACE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        let database = DbConfig::from_env();

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            process_name,
            server_name,
            heartbeat_interval,
            drain_grace,
            database,
        })
    }
}
