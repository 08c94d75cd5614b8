//! Store error types.

use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the store.
    #[error("failed to connect to store: {0}")]
    Connect(#[source] sqlx::Error),

    /// A read or write against a collection failed.
    #[error("{collection} query failed: {source}")]
    Query {
        collection: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/delivery.")]
    MigrationDirNotFound { tried: String, last_error: String },

    /// A stored document field failed to decode.
    #[error("stored document is malformed: {0}")]
    Document(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store reported itself unavailable.
    ///
    /// Produced by the in-memory backend under injected faults; the
    /// Postgres backend surfaces `Connect`/`Query` instead.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
