/// Query log persistence
///
/// One row per successfully answered turn, for analytics consumers and
/// `roster history`.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub id: Option<i64>,
    pub session_id: String,
    pub input: String,
    pub filter_json: String,
    pub fingerprint: Option<String>,
    pub result_count: i64,
    pub cache_outcome: Option<String>,
    pub created_at: i64,
}

impl QueryLogEntry {
    /// A new entry stamped with the current time
    pub fn new(session_id: &str, input: &str, filter_json: String, result_count: usize) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        Self {
            id: None,
            session_id: session_id.to_string(),
            input: input.to_string(),
            filter_json,
            fingerprint: None,
            result_count: result_count as i64,
            cache_outcome: None,
            created_at,
        }
    }
}

#[derive(Clone)]
pub struct QueryLogRepository {
    pool: SqlitePool,
}

impl QueryLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an entry and return its row id
    pub async fn record(&self, entry: &QueryLogEntry) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO query_log
                (session_id, input, filter_json, fingerprint, result_count, cache_outcome, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.session_id)
        .bind(&entry.input)
        .bind(&entry.filter_json)
        .bind(&entry.fingerprint)
        .bind(entry.result_count)
        .bind(&entry.cache_outcome)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to record query")?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent entries first
    pub async fn recent(&self, limit: i64) -> Result<Vec<QueryLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, session_id, input, filter_json, fingerprint, result_count, cache_outcome, created_at
             FROM query_log ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch query log")?;

        Ok(rows.iter().map(entry_from_row).collect())
    }

    pub async fn for_session(&self, session_id: &str) -> Result<Vec<QueryLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, session_id, input, filter_json, fingerprint, result_count, cache_outcome, created_at
             FROM query_log WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch session queries")?;

        Ok(rows.iter().map(entry_from_row).collect())
    }
}

fn entry_from_row(r: &SqliteRow) -> QueryLogEntry {
    QueryLogEntry {
        id: r.get("id"),
        session_id: r.get("session_id"),
        input: r.get("input"),
        filter_json: r.get("filter_json"),
        fingerprint: r.get("fingerprint"),
        result_count: r.get("result_count"),
        cache_outcome: r.get("cache_outcome"),
        created_at: r.get("created_at"),
    }
}
