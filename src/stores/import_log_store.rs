use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::constants::{DEFAULT_LIMIT, DEFAULT_PAGE};
use crate::models::{ImportLog, RunCounts};

/// Opens the audit row for a run attempt inside the caller's transaction,
/// so the log and the run's job writes commit or roll back together.
pub async fn insert_started(
    conn: &mut SqliteConnection,
    started_at: DateTime<Utc>,
    file_name: &str,
) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO import_logs (started_at, file_name) VALUES (?1, ?2) RETURNING id",
    )
    .bind(started_at)
    .bind(file_name)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get::<i64, _>("id"))
}

pub async fn finalize(
    conn: &mut SqliteConnection,
    id: i64,
    counts: &RunCounts,
    ended_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE import_logs
        SET total = ?2, new_count = ?3, updated_count = ?4, failed_count = ?5, ended_at = ?6
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(counts.total)
    .bind(counts.new_count)
    .bind(counts.updated_count)
    .bind(counts.failed_count)
    .bind(ended_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[derive(Clone, Copy, Debug)]
pub struct HistoryFilter {
    pub page: i64,
    pub limit: i64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            start: None,
            end: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HistoryPage {
    pub logs: Vec<ImportLog>,
    pub total: i64,
}

/// Paginated audit history, newest runs first, optionally restricted to a
/// started_at range. Empty results are an empty page, never an error.
pub async fn history(pool: &SqlitePool, filter: &HistoryFilter) -> Result<HistoryPage> {
    let page = filter.page.max(1);
    let limit = filter.limit.clamp(1, 100);
    let offset = (page - 1) * limit;

    let logs = sqlx::query_as::<_, ImportLog>(
        r#"
        SELECT id, started_at, ended_at, total, new_count, updated_count, failed_count, file_name
        FROM import_logs
        WHERE (?1 IS NULL OR started_at >= ?1)
          AND (?2 IS NULL OR started_at <= ?2)
        ORDER BY started_at DESC
        LIMIT ?3 OFFSET ?4
        "#,
    )
    .bind(filter.start)
    .bind(filter.end)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM import_logs
        WHERE (?1 IS NULL OR started_at >= ?1)
          AND (?2 IS NULL OR started_at <= ?2)
        "#,
    )
    .bind(filter.start)
    .bind(filter.end)
    .fetch_one(pool)
    .await?;

    Ok(HistoryPage { logs, total })
}
