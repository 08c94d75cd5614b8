//! Postgres store backend.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPool, postgres::PgRow, Row};

use dmp_proto::EncryptionMethod;

use crate::model::{Action, ActionEncryption, ActionStatus, PendingUpdate, ProgressEntry, Resends};

use super::store::{ActionStore, Application, Device, DirectoryStore, OpsStore};
use super::StoreError;

/// A row from the actions table.
#[derive(Debug, Clone)]
struct ActionRow {
    id: String,
    device_id: String,
    tokencard_id: String,
    encryption_method: String,
    action: String,
    request_id: String,
    params: Option<Value>,
    status: i32,
    timeout_at: i64,
    resend_timeout: i64,
    num_resends: i32,
    max_resends: i32,
    resend_after: Option<i64>,
    progress: Value,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ActionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            device_id: row.try_get("device_id")?,
            tokencard_id: row.try_get("tokencard_id")?,
            encryption_method: row.try_get("encryption_method")?,
            action: row.try_get("action")?,
            request_id: row.try_get("request_id")?,
            params: row.try_get("params")?,
            status: row.try_get("status")?,
            timeout_at: row.try_get("timeout_at")?,
            resend_timeout: row.try_get("resend_timeout")?,
            num_resends: row.try_get("num_resends")?,
            max_resends: row.try_get("max_resends")?,
            resend_after: row.try_get("resend_after")?,
            progress: row.try_get("progress")?,
        })
    }
}

impl ActionRow {
    fn into_action(self) -> Result<Action, StoreError> {
        let method: EncryptionMethod = self
            .encryption_method
            .parse()
            .map_err(|e: dmp_proto::UnknownEncryptionMethod| StoreError::Document(e.to_string()))?;

        let progress: Vec<ProgressEntry> = serde_json::from_value(self.progress)?;

        Ok(Action {
            encryption: ActionEncryption {
                method,
                tokencard_id: self.tokencard_id.clone(),
            },
            id: self.id,
            device_id: self.device_id,
            tokencard_id: self.tokencard_id,
            action: self.action,
            request_id: self.request_id,
            params: self.params,
            status: ActionStatus::from_code(self.status),
            timeout_at: self.timeout_at,
            resends: Resends {
                resend_timeout: self.resend_timeout,
                num_resends: self.num_resends.max(0) as u32,
                max_resends: self.max_resends.max(0) as u32,
                resend_after: self.resend_after,
            },
            progress,
        })
    }
}

/// Postgres store backend implementing all three store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store handle over a pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActionStore for PgStore {
    async fn candidate_actions(
        &self,
        device_id: &str,
        tokencard_id: &str,
        limit: i64,
    ) -> Result<Vec<Action>, StoreError> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT
                id,
                device_id,
                tokencard_id,
                encryption_method,
                action,
                request_id,
                params,
                status,
                timeout_at,
                resend_timeout,
                num_resends,
                max_resends,
                resend_after,
                progress
            FROM actions
            WHERE device_id = $1
              AND tokencard_id = $2
              AND status < 10
            ORDER BY (progress -> 0 ->> 'timestamp')::bigint ASC NULLS LAST
            LIMIT $3
            "#,
        )
        .bind(device_id)
        .bind(tokencard_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| StoreError::Query {
            collection: "actions",
            source,
        })?;

        rows.into_iter().map(ActionRow::into_action).collect()
    }

    async fn apply_update(&self, update: &PendingUpdate) -> Result<(), StoreError> {
        let entry = serde_json::to_value(&update.progress)?;
        let increment: i32 = if update.increments_resends() { 1 } else { 0 };

        sqlx::query(
            r#"
            UPDATE actions
            SET status = $2,
                progress = progress || $3::jsonb,
                resend_after = COALESCE($4, resend_after),
                num_resends = num_resends + $5
            WHERE id = $1
            "#,
        )
        .bind(&update.action_id)
        .bind(update.status.code())
        .bind(&entry)
        .bind(update.resend_after)
        .bind(increment)
        .execute(&self.pool)
        .await
        .map_err(|source| StoreError::Query {
            collection: "actions",
            source,
        })?;

        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for PgStore {
    async fn device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        let row = sqlx::query("SELECT id, apps FROM devices WHERE id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                collection: "devices",
                source,
            })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id").map_err(|source| StoreError::Query {
            collection: "devices",
            source,
        })?;
        let apps: Value = row.try_get("apps").map_err(|source| StoreError::Query {
            collection: "devices",
            source,
        })?;

        let apps = match apps {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Document(format!(
                    "device {id} apps field is not an object: {other}"
                )))
            }
        };

        Ok(Some(Device { id, apps }))
    }

    async fn application(&self, tokencard_id: &str) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query("SELECT id, tokens FROM applications WHERE id = $1")
            .bind(tokencard_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                collection: "applications",
                source,
            })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id").map_err(|source| StoreError::Query {
            collection: "applications",
            source,
        })?;
        let tokens: Option<Value> = row.try_get("tokens").map_err(|source| StoreError::Query {
            collection: "applications",
            source,
        })?;

        let tokens = match tokens {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(items),
            Some(other) => {
                return Err(StoreError::Document(format!(
                    "application {id} tokens field is not an array: {other}"
                )))
            }
        };

        Ok(Some(Application { id, tokens }))
    }
}

#[async_trait]
impl OpsStore for PgStore {
    async fn record_heartbeat(
        &self,
        process_name: &str,
        server_name: &str,
        at_ms: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO worker_heartbeats (process_name, server_name, last_seen)
            VALUES ($1, $2, $3)
            ON CONFLICT (process_name, server_name)
            DO UPDATE SET last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(process_name)
        .bind(server_name)
        .bind(at_ms)
        .execute(&self.pool)
        .await
        .map_err(|source| StoreError::Query {
            collection: "worker_heartbeats",
            source,
        })?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Query {
                collection: "store",
                source,
            })?;
        Ok(())
    }
}
