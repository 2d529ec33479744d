use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sipin_schemas::{IngestRecord, SipStatus, POLLER_EVENT_TYPE};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::{StateStore, StoreError, DEFAULT_TABLE};

// ---------------------------------------------------------------------------
// TableName
// ---------------------------------------------------------------------------

/// Validated, optionally schema-qualified table identifier.
///
/// The table name comes from config and is interpolated into SQL text (it
/// cannot be a bind parameter), so only plain identifiers are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: String,
    table: String,
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TableName {
    /// Parse `table` or `schema.table`. Schema defaults to `public`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (schema, table) = match s.split_once('.') {
            Some((schema, table)) => (schema, table),
            None => ("public", s),
        };
        if !is_plain_identifier(schema) || !is_plain_identifier(table) {
            return Err(anyhow!(
                "invalid table name '{}': expected [schema.]table with [A-Za-z_][A-Za-z0-9_]*",
                s
            ));
        }
        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// True for the one table the embedded migrations create.
    pub fn created_by_migrations(&self) -> bool {
        *self == Self::default()
    }

    /// `"schema"."table"`
    pub fn quoted(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// SQL text for every guarded operation, rendered once for one table.
#[derive(Debug, Clone)]
struct Statements {
    ingest_failed: String,
    ingest: String,
    ingest_pid: String,
    pids_in_progress: String,
    mam_success: String,
    mam_failure: String,
    fetch: String,
    insert: String,
    count_status: String,
}

impl Statements {
    fn render(t: &TableName) -> Self {
        let t = t.quoted();
        Self {
            ingest_failed: format!(
                r#"
                update {t}
                set last_event_type = $2,
                    last_event_occurred_at = $3,
                    status = $4,
                    failure_message = $5
                where correlation_id = $1
                  and (last_event_occurred_at is null or last_event_occurred_at < $3)
                "#
            ),
            ingest: format!(
                r#"
                update {t}
                set last_event_type = $2,
                    last_event_occurred_at = $3
                where correlation_id = $1
                  and (last_event_occurred_at is null or last_event_occurred_at < $3)
                "#
            ),
            ingest_pid: format!(
                r#"
                update {t}
                set pid = $2
                where correlation_id = $1
                  and pid is null
                "#
            ),
            pids_in_progress: format!(
                r#"
                select distinct pid
                from {t}
                where status = $1
                  and pid is not null
                order by pid
                "#
            ),
            mam_success: format!(
                r#"
                update {t}
                set status = $2,
                    last_event_type = case
                        when last_event_occurred_at is null or last_event_occurred_at <= $4 then $3
                        else last_event_type
                    end,
                    last_event_occurred_at = greatest(last_event_occurred_at, $4)
                where pid = $1
                  and status = $5
                "#
            ),
            mam_failure: format!(
                r#"
                update {t}
                set status = $2,
                    last_event_type = case
                        when last_event_occurred_at is null or last_event_occurred_at <= $4 then $3
                        else last_event_type
                    end,
                    last_event_occurred_at = greatest(last_event_occurred_at, $4),
                    failure_message = $6
                where pid = $1
                  and status = $5
                "#
            ),
            fetch: format!(
                r#"
                select
                  correlation_id,
                  pid,
                  status,
                  last_event_type,
                  last_event_occurred_at,
                  failure_message
                from {t}
                where correlation_id = $1
                "#
            ),
            insert: format!(
                r#"
                insert into {t} (
                  correlation_id, pid, status, last_event_type, last_event_occurred_at, failure_message
                ) values (
                  $1, $2, $3, $4, $5, $6
                )
                "#
            ),
            count_status: format!("select count(*) from {t} where status = $1"),
        }
    }
}

// ---------------------------------------------------------------------------
// PgStateStore
// ---------------------------------------------------------------------------

/// Postgres-backed [`StateStore`]. Each call takes its own short-lived
/// connection from the pool and commits immediately.
#[derive(Debug, Clone)]
pub struct PgStateStore {
    pool: PgPool,
    table: TableName,
    sql: Statements,
}

impl PgStateStore {
    pub fn new(pool: PgPool, table: TableName) -> Self {
        let sql = Statements::render(&table);
        Self { pool, table, sql }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Fallible form of [`StateStore::select_pids_in_progress`].
    pub async fn try_select_pids_in_progress(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(&self.sql.pids_in_progress)
            .bind(SipStatus::InProgress.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("select_pids_in_progress", e))?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let pid: String = r
                .try_get("pid")
                .map_err(|e| StoreError::from_sqlx("select_pids_in_progress", e))?;
            out.push(pid);
        }
        Ok(out)
    }

    /// Read one row by correlation id.
    pub async fn fetch_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<IngestRecord>, StoreError> {
        const OP: &str = "fetch_by_correlation_id";
        let row = sqlx::query(&self.sql.fetch)
            .bind(correlation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(OP, e))?;

        let Some(r) = row else {
            return Ok(None);
        };

        let status_raw: String = r.try_get("status").map_err(|e| StoreError::from_sqlx(OP, e))?;
        let status = SipStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::new(OP, format!("invalid status in row: {status_raw}")))?;

        Ok(Some(IngestRecord {
            correlation_id: r
                .try_get("correlation_id")
                .map_err(|e| StoreError::from_sqlx(OP, e))?,
            pid: r.try_get("pid").map_err(|e| StoreError::from_sqlx(OP, e))?,
            status,
            last_event_type: r
                .try_get("last_event_type")
                .map_err(|e| StoreError::from_sqlx(OP, e))?,
            last_event_occurred_at: r
                .try_get("last_event_occurred_at")
                .map_err(|e| StoreError::from_sqlx(OP, e))?,
            failure_message: r
                .try_get("failure_message")
                .map_err(|e| StoreError::from_sqlx(OP, e))?,
        }))
    }

    /// Number of rows currently in `status`.
    pub async fn count_by_status(&self, status: SipStatus) -> Result<i64, StoreError> {
        let (n,): (i64,) = sqlx::query_as(&self.sql.count_status)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("count_by_status", e))?;
        Ok(n)
    }

    /// Insert a row. Row creation belongs to the upstream creator; this is
    /// here for fixtures and operator tooling.
    pub async fn insert_record(&self, rec: &IngestRecord) -> Result<(), StoreError> {
        sqlx::query(&self.sql.insert)
            .bind(&rec.correlation_id)
            .bind(&rec.pid)
            .bind(rec.status.as_str())
            .bind(&rec.last_event_type)
            .bind(rec.last_event_occurred_at)
            .bind(&rec.failure_message)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("insert_record", e))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn update_sip_ingest_failed(
        &self,
        correlation_id: &str,
        event_type: &str,
        event_timestamp: DateTime<Utc>,
        failure_message: &str,
    ) -> Result<u64, StoreError> {
        let res = sqlx::query(&self.sql.ingest_failed)
            .bind(correlation_id)
            .bind(event_type)
            .bind(event_timestamp)
            .bind(SipStatus::Failure.as_str())
            .bind(failure_message)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("update_sip_ingest_failed", e))?;
        Ok(res.rows_affected())
    }

    async fn update_sip_ingest(
        &self,
        correlation_id: &str,
        event_type: &str,
        event_timestamp: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let res = sqlx::query(&self.sql.ingest)
            .bind(correlation_id)
            .bind(event_type)
            .bind(event_timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("update_sip_ingest", e))?;
        Ok(res.rows_affected())
    }

    async fn update_sip_ingest_pid(
        &self,
        correlation_id: &str,
        pid: &str,
    ) -> Result<u64, StoreError> {
        let res = sqlx::query(&self.sql.ingest_pid)
            .bind(correlation_id)
            .bind(pid)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("update_sip_ingest_pid", e))?;
        Ok(res.rows_affected())
    }

    async fn select_pids_in_progress(&self) -> Vec<String> {
        match self.try_select_pids_in_progress().await {
            Ok(pids) => pids,
            Err(e) => {
                warn!(error = %e, "pending pid query failed; treating as no pending SIPs");
                Vec::new()
            }
        }
    }

    async fn update_sip_mam_success(
        &self,
        pid: &str,
        event_timestamp: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let res = sqlx::query(&self.sql.mam_success)
            .bind(pid)
            .bind(SipStatus::Success.as_str())
            .bind(POLLER_EVENT_TYPE)
            .bind(event_timestamp)
            .bind(SipStatus::InProgress.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("update_sip_mam_success", e))?;
        debug!(pid, rows = res.rows_affected(), "mam success applied");
        Ok(res.rows_affected())
    }

    async fn update_sip_mam_failure(
        &self,
        pid: &str,
        event_timestamp: DateTime<Utc>,
        failure_message: &str,
    ) -> Result<u64, StoreError> {
        let res = sqlx::query(&self.sql.mam_failure)
            .bind(pid)
            .bind(SipStatus::Failure.as_str())
            .bind(POLLER_EVENT_TYPE)
            .bind(event_timestamp)
            .bind(SipStatus::InProgress.as_str())
            .bind(failure_message)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("update_sip_mam_failure", e))?;
        debug!(pid, rows = res.rows_affected(), "mam failure applied");
        Ok(res.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_defaults_to_public_schema() {
        let t = TableName::parse("sipin_sips").unwrap();
        assert_eq!(t.schema(), "public");
        assert_eq!(t.table(), "sipin_sips");
        assert_eq!(t.quoted(), "\"public\".\"sipin_sips\"");
    }

    #[test]
    fn table_name_accepts_schema_qualified() {
        let t = TableName::parse(" ingest.sips_v2 ").unwrap();
        assert_eq!(t.to_string(), "ingest.sips_v2");
    }

    #[test]
    fn only_default_table_is_created_by_migrations() {
        assert!(TableName::parse("sipin_sips").unwrap().created_by_migrations());
        assert!(TableName::parse("public.sipin_sips").unwrap().created_by_migrations());
        assert!(!TableName::parse("ingest.sips").unwrap().created_by_migrations());
        assert!(!TableName::parse("ingest.sipin_sips").unwrap().created_by_migrations());
    }

    #[test]
    fn table_name_rejects_injection() {
        assert!(TableName::parse("sips; drop table x").is_err());
        assert!(TableName::parse("\"quoted\"").is_err());
        assert!(TableName::parse("1abc").is_err());
        assert!(TableName::parse("").is_err());
        assert!(TableName::parse("a.b.c").is_err());
    }

    #[test]
    fn event_path_updates_carry_the_timestamp_guard() {
        let sql = Statements::render(&TableName::default());
        for stmt in [&sql.ingest_failed, &sql.ingest] {
            assert!(stmt.contains("last_event_occurred_at is null or last_event_occurred_at < $3"));
            assert!(!stmt.contains("status = $5"));
        }
        assert!(sql.ingest_pid.contains("and pid is null"));
    }

    #[test]
    fn poller_updates_are_guarded_on_in_progress_and_never_rewind() {
        let sql = Statements::render(&TableName::default());
        for stmt in [&sql.mam_success, &sql.mam_failure] {
            assert!(stmt.contains("and status = $5"));
            assert!(stmt.contains("greatest(last_event_occurred_at, $4)"));
        }
    }

    #[test]
    fn poller_updates_keep_event_type_paired_with_timestamp() {
        let sql = Statements::render(&TableName::default());
        for stmt in [&sql.mam_success, &sql.mam_failure] {
            assert!(!stmt.contains("last_event_type = $3,"));
            assert!(stmt.contains(
                "when last_event_occurred_at is null or last_event_occurred_at <= $4 then $3"
            ));
            assert!(stmt.contains("else last_event_type"));
        }
    }
}
