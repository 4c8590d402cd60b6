use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use crate::models::NormalizedJob;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Idempotent write of one canonical job, scoped to the caller's transaction.
/// The UNIQUE (external_id, source) index is the only serialization point
/// between concurrent workers: the second writer for the same pair lands on
/// the conflict branch and becomes an update.
///
/// Classification piggybacks on the timestamps this store assigns itself: an
/// insert writes `now` to both columns, a conflict update only touches
/// `updated_at`, so `created_at = updated_at` after the write means the row
/// was created by it. Both values are compared as stored, no decode involved.
pub async fn upsert(
    conn: &mut SqliteConnection,
    job: &NormalizedJob,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    if job.external_id.is_empty() {
        bail!("job from {} has no external id", job.source);
    }

    let row = sqlx::query(
        r#"
        INSERT INTO jobs (
            external_id, source, title, description, url, company, location,
            posted_at, raw, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        ON CONFLICT (external_id, source) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            url = excluded.url,
            company = excluded.company,
            location = excluded.location,
            posted_at = excluded.posted_at,
            raw = excluded.raw,
            updated_at = excluded.updated_at
        RETURNING (created_at = updated_at) AS was_created
        "#,
    )
    .bind(&job.external_id)
    .bind(&job.source)
    .bind(&job.title)
    .bind(&job.description)
    .bind(&job.url)
    .bind(&job.company)
    .bind(&job.location)
    .bind(job.posted_at)
    .bind(&job.raw)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    if row.get::<bool, _>("was_created") {
        Ok(UpsertOutcome::Created)
    } else {
        Ok(UpsertOutcome::Updated)
    }
}

pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs")
        .fetch_one(&mut *conn)
        .await?;
    Ok(total)
}
