use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::constants::{FETCH_TIMEOUT_SECS, INITIAL_BACKOFF_MS, MAX_ATTEMPTS};
use crate::context::AppContext;
use crate::models::{ImportLog, RunCounts};
use crate::queue::ImportTask;
use crate::services::broadcaster::ProgressEvent;
use crate::services::{fetcher, normalizer};
use crate::stores::job_store::{self, UpsertOutcome};
use crate::stores::import_log_store;

/// Runs one import task to completion: fetch, normalize, upsert and log as a
/// single transaction, retrying failed attempts with doubling backoff. Always
/// returns; every outcome is reported through the broadcaster.
pub async fn run_import(ctx: &AppContext, task: &ImportTask) {
    let mut attempts = 0;
    let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);

    loop {
        match run_attempt(ctx, task).await {
            Ok(log) => {
                info!(
                    file = %task.file_name,
                    total = log.total,
                    new = log.new_count,
                    updated = log.updated_count,
                    failed = log.failed_count,
                    "import completed"
                );
                ctx.broadcaster.publish(ProgressEvent::Completed(log));
                return;
            }
            Err(err) => {
                attempts += 1;
                if attempts < MAX_ATTEMPTS {
                    warn!(
                        file = %task.file_name,
                        attempt = attempts,
                        "import attempt failed, retrying in {:?}: {err:#}",
                        backoff
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                } else {
                    error!(file = %task.file_name, "import abandoned after {attempts} attempts: {err:#}");
                    if let Err(log_err) = record_failed_run(ctx, task).await {
                        error!(file = %task.file_name, "could not record failed run: {log_err:#}");
                    }
                    ctx.broadcaster.publish(ProgressEvent::Failed {
                        file_name: task.file_name.clone(),
                        error: err.to_string(),
                    });
                    return;
                }
            }
        }
    }
}

/// One attempt. The log row, every job write and the final accounting share
/// a transaction; any error before the commit point rolls all of it back and
/// the next attempt starts from a fresh log row.
async fn run_attempt(ctx: &AppContext, task: &ImportTask) -> Result<ImportLog> {
    let mut tx = ctx.db.begin().await?;

    let started_at = Utc::now();
    let log_id = import_log_store::insert_started(&mut tx, started_at, &task.file_name).await?;
    ctx.broadcaster.publish(ProgressEvent::Running(ImportLog::started(
        log_id,
        started_at,
        &task.file_name,
    )));

    let body = ctx
        .feed_source
        .fetch(&task.url, Duration::from_secs(FETCH_TIMEOUT_SECS))
        .await?;
    let tree = fetcher::parse_feed(&body)?;
    let jobs = normalizer::normalize(&tree, &task.url);

    let mut counts = RunCounts {
        total: jobs.len() as i64,
        ..Default::default()
    };
    for job in &jobs {
        match job_store::upsert(&mut tx, job, Utc::now()).await {
            Ok(UpsertOutcome::Created) => counts.new_count += 1,
            Ok(UpsertOutcome::Updated) => counts.updated_count += 1,
            // A single bad record never aborts the run.
            Err(err) => {
                debug!(file = %task.file_name, "record skipped: {err:#}");
                counts.failed_count += 1;
            }
        }
    }

    let ended_at = Utc::now();
    import_log_store::finalize(&mut tx, log_id, &counts, ended_at).await?;
    tx.commit().await?;

    Ok(ImportLog {
        id: log_id,
        started_at,
        ended_at: Some(ended_at),
        total: counts.total,
        new_count: counts.new_count,
        updated_count: counts.updated_count,
        failed_count: counts.failed_count,
        file_name: task.file_name.clone(),
    })
}

/// After exhausted retries the intermediate logs have all been rolled back;
/// persist a single finalized row so the audit trail shows the failed run.
async fn record_failed_run(ctx: &AppContext, task: &ImportTask) -> Result<()> {
    let mut tx = ctx.db.begin().await?;
    let now = Utc::now();
    let log_id = import_log_store::insert_started(&mut tx, now, &task.file_name).await?;
    import_log_store::finalize(&mut tx, log_id, &RunCounts::default(), now).await?;
    tx.commit().await?;
    Ok(())
}
