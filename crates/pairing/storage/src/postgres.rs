//! PostgreSQL adapter for pairing storage.
//!
//! The single-active-run rule is a partial unique index, so two concurrent
//! inserts for one group cannot both commit regardless of what either caller
//! checked beforehand. Writes run under `SERIALIZABLE` isolation.

use crate::model::StoredRun;
use crate::traits::{PairingRunStore, QueryWindow};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairing_types::{
    validate_edge_set, GroupId, PairingEdge, PairingRun, ParticipantId, RunId, RunStatus,
};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";

/// PostgreSQL-backed pairing store.
#[derive(Clone)]
pub struct PostgresPairingStore {
    pool: PgPool,
}

impl PostgresPairingStore {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS pairing_runs (
                run_id UUID PRIMARY KEY,
                group_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                retired_at TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS pairing_runs_one_active_per_group
                ON pairing_runs (group_id)
             WHERE status = 'active'
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS pairing_runs_by_group
                ON pairing_runs (group_id, created_at DESC)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pairing_edges (
                run_id UUID NOT NULL REFERENCES pairing_runs (run_id),
                giver_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (run_id, giver_id),
                UNIQUE (run_id, receiver_id),
                CHECK (giver_id <> receiver_id)
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl PairingRunStore for PostgresPairingStore {
    async fn insert_active_run(
        &self,
        run: PairingRun,
        edges: Vec<PairingEdge>,
    ) -> StorageResult<()> {
        if run.status != RunStatus::Active {
            return Err(StorageError::InvariantViolation(format!(
                "run {} must be inserted as active, found {}",
                run.id, run.status
            )));
        }
        validate_edge_set(&run.id, &edges)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        set_serializable(&mut tx).await?;

        sqlx::query(
            r#"
            INSERT INTO pairing_runs (run_id, group_id, status, created_at, retired_at)
            VALUES ($1, $2, $3, $4, NULL)
            "#,
        )
        .bind(*run.id.as_uuid())
        .bind(run.group_id.as_str())
        .bind(run.status.as_str())
        .bind(run.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        for edge in &edges {
            sqlx::query(
                r#"
                INSERT INTO pairing_edges (run_id, giver_id, receiver_id, position)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(*edge.run_id.as_uuid())
            .bind(edge.giver_id.as_str())
            .bind(edge.receiver_id.as_str())
            .bind(to_i32(edge.position)?)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(group = %run.group_id, run = %run.id, edges = edges.len(), "pairing run committed");
        Ok(())
    }

    async fn retire_active_run(
        &self,
        group_id: &GroupId,
        retired_at: DateTime<Utc>,
    ) -> StorageResult<Option<PairingRun>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        set_serializable(&mut tx).await?;

        let row = sqlx::query(
            r#"
            UPDATE pairing_runs
               SET status = 'retired',
                   retired_at = $2
             WHERE group_id = $1
               AND status = 'active'
            RETURNING run_id, group_id, status, created_at, retired_at
            "#,
        )
        .bind(group_id.as_str())
        .bind(retired_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        row.map(run_row_to_record).transpose()
    }

    async fn active_run(&self, group_id: &GroupId) -> StorageResult<Option<StoredRun>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(
            r#"
            SELECT run_id, group_id, status, created_at, retired_at
              FROM pairing_runs
             WHERE group_id = $1
               AND status = 'active'
            "#,
        )
        .bind(group_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let Some(row) = row else {
            tx.commit().await.map_err(map_sqlx_error)?;
            return Ok(None);
        };
        let run = run_row_to_record(row)?;
        let edges = fetch_edges(&mut tx, &run.id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(StoredRun { run, edges }))
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<Option<PairingRun>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, group_id, status, created_at, retired_at
              FROM pairing_runs
             WHERE run_id = $1
            "#,
        )
        .bind(*run_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(run_row_to_record).transpose()
    }

    async fn list_edges(&self, run_id: &RunId) -> StorageResult<Vec<PairingEdge>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        fetch_edges(&mut conn, run_id).await
    }

    async fn list_runs(
        &self,
        group_id: &GroupId,
        window: QueryWindow,
    ) -> StorageResult<Vec<PairingRun>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT run_id, group_id, status, created_at, retired_at
                  FROM pairing_runs
                 WHERE group_id = $1
                 ORDER BY created_at DESC
                 OFFSET $2
                "#,
            )
            .bind(group_id.as_str())
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT run_id, group_id, status, created_at, retired_at
                  FROM pairing_runs
                 WHERE group_id = $1
                 ORDER BY created_at DESC
                 LIMIT $2 OFFSET $3
                "#,
            )
            .bind(group_id.as_str())
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(run_row_to_record).collect()
    }
}

async fn set_serializable(conn: &mut PgConnection) -> StorageResult<()> {
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(())
}

async fn fetch_edges(conn: &mut PgConnection, run_id: &RunId) -> StorageResult<Vec<PairingEdge>> {
    let rows = sqlx::query(
        r#"
        SELECT run_id, giver_id, receiver_id, position
          FROM pairing_edges
         WHERE run_id = $1
         ORDER BY position ASC
        "#,
    )
    .bind(*run_id.as_uuid())
    .fetch_all(conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;

    rows.into_iter().map(edge_row_to_record).collect()
}

fn run_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<PairingRun> {
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(PairingRun {
        id: RunId::from_uuid(
            row.try_get::<Uuid, _>("run_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        group_id: GroupId::new(
            row.try_get::<String, _>("group_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        status: status.parse::<RunStatus>().map_err(StorageError::Serialization)?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        retired_at: row
            .try_get("retired_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn edge_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<PairingEdge> {
    let position: i32 = row
        .try_get("position")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(PairingEdge {
        run_id: RunId::from_uuid(
            row.try_get::<Uuid, _>("run_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        giver_id: ParticipantId::new(
            row.try_get::<String, _>("giver_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        receiver_id: ParticipantId::new(
            row.try_get::<String, _>("receiver_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        position: u32::try_from(position)
            .map_err(|_| StorageError::Serialization(format!("negative edge position {position}")))?,
    })
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StorageError::Conflict(db_err.message().to_string()),
            Some(SERIALIZATION_FAILURE) => {
                return StorageError::Backend(format!(
                    "serialization failure, transaction may be retried: {}",
                    db_err.message()
                ))
            }
            _ => {}
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}

fn to_i32(value: u32) -> StorageResult<i32> {
    i32::try_from(value)
        .map_err(|_| StorageError::InvalidInput("edge position too large".to_string()))
}
