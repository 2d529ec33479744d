//! sipin-db
//!
//! The guarded persistence contract ([`StateStore`]) shared by the event path
//! and the archive poller, plus its Postgres implementation ([`PgStateStore`]).
//!
//! Every mutating operation is one auto-committing UPDATE whose WHERE clause
//! carries the guard. The returned row count distinguishes a guarded no-op
//! (`Ok(0)`) from a real failure (`Err(StoreError)`).

mod pg;

pub use pg::{PgStateStore, TableName};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub const ENV_DB_URL: &str = "SIPIN_DATABASE_URL";

/// Table created by the embedded migration and used when config names none.
pub const DEFAULT_TABLE: &str = "sipin_sips";

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Transient store failure (connection, pool, statement execution).
///
/// Never produced for a guarded no-op; those return `Ok(0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// Store operation that failed (e.g. `"update_sip_ingest"`).
    pub op: &'static str,
    pub message: String,
}

impl StoreError {
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }

    pub(crate) fn from_sqlx(op: &'static str, err: sqlx::Error) -> Self {
        Self::new(op, err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store error in {}: {}", self.op, self.message)
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Guarded single-statement operations on ingest rows.
///
/// | Operation                   | Guard                                    |
/// |-----------------------------|------------------------------------------|
/// | `update_sip_ingest_failed`  | `ts` > stored `last_event_occurred_at`   |
/// | `update_sip_ingest`         | `ts` > stored `last_event_occurred_at`   |
/// | `update_sip_ingest_pid`     | stored `pid` is NULL                     |
/// | `update_sip_mam_success`    | stored `status` = `in_progress`          |
/// | `update_sip_mam_failure`    | stored `status` = `in_progress`          |
///
/// A NULL `last_event_occurred_at` is older than every timestamp. The two
/// archive-poller writes never move `last_event_occurred_at` backwards: the
/// stored value becomes the greater of the stored and supplied timestamps.
/// `last_event_type` follows the timestamp that is kept, so it only becomes
/// the poller's event type when the supplied timestamp is not older than the
/// stored one. `status` and `failure_message` are written either way.
///
/// Implementations must make each operation atomic on its own. No caller
/// wraps two operations in one transaction.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Mark a SIP failed from a pipeline event.
    async fn update_sip_ingest_failed(
        &self,
        correlation_id: &str,
        event_type: &str,
        event_timestamp: DateTime<Utc>,
        failure_message: &str,
    ) -> Result<u64, StoreError>;

    /// Record a successful pipeline event. Never touches `status`.
    async fn update_sip_ingest(
        &self,
        correlation_id: &str,
        event_type: &str,
        event_timestamp: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Assign the archive pid, once.
    async fn update_sip_ingest_pid(&self, correlation_id: &str, pid: &str)
        -> Result<u64, StoreError>;

    /// Distinct non-null pids of rows still `in_progress`.
    ///
    /// Degrades to an empty list when the store is unreachable so that the
    /// poller simply skips a cycle.
    async fn select_pids_in_progress(&self) -> Vec<String>;

    /// Archive reports the SIP archived.
    async fn update_sip_mam_success(
        &self,
        pid: &str,
        event_timestamp: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Archive reports the SIP failed or rejected.
    async fn update_sip_mam_failure(
        &self,
        pid: &str,
        event_timestamp: DateTime<Utc>,
        failure_message: &str,
    ) -> Result<u64, StoreError>;
}

// ---------------------------------------------------------------------------
// Pool + schema helpers
// ---------------------------------------------------------------------------

/// Connect to Postgres.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Connect to Postgres using SIPIN_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 4).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Run the embedded migrations for `table` and confirm it exists afterwards.
///
/// The migrations only create `public.sipin_sips`. Any other table must
/// already exist; it is checked and left alone. Returns whether the
/// migrations ran.
pub async fn migrate_for(pool: &PgPool, table: &TableName) -> Result<bool> {
    if !table.created_by_migrations() {
        let s = status(pool, table).await?;
        if !s.has_table {
            anyhow::bail!(
                "MIGRATION_TABLE_MISMATCH: embedded migrations create {} only; create {} from migrations/0001_sipin_sips.sql or set db.table to {}",
                TableName::default(),
                table,
                DEFAULT_TABLE
            );
        }
        return Ok(false);
    }

    migrate(pool).await?;
    let s = status(pool, table).await?;
    if !s.has_table {
        anyhow::bail!(
            "MIGRATION_TABLE_MISMATCH: migrations ran but {} is missing; check the connection's search_path",
            table
        );
    }
    Ok(true)
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_table: bool,
}

/// Connectivity + presence of the ingest table.
pub async fn status(pool: &PgPool, table: &TableName) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = $1 and table_name = $2
        )
        "#,
    )
    .bind(table.schema())
    .bind(table.table())
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_table: exists,
    })
}
