// src/cron/schedule.rs
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::queue;

/// Calculates the next firing for a six-field cron expression
/// ("sec min hour day month weekday"). Covers the interval and fixed-time
/// patterns a feed-import schedule actually uses; anything fancier is
/// rejected up front so a typo fails at startup, not silently.
pub fn next_execution(cron_expr: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 {
        return Err(anyhow!(
            "invalid cron expression {cron_expr:?}: expected 6 parts (sec min hour day month weekday)"
        ));
    }

    match cron_expr {
        "0 * * * * *" => Ok(from + Duration::minutes(1)),
        "0 */5 * * * *" => Ok(from + Duration::minutes(5)),
        "0 */10 * * * *" => Ok(from + Duration::minutes(10)),
        "0 */15 * * * *" => Ok(from + Duration::minutes(15)),
        "0 */30 * * * *" => Ok(from + Duration::minutes(30)),
        "0 0 * * * *" => Ok(from + Duration::hours(1)),
        "0 0 0 * * *" => {
            let next = (from + Duration::days(1))
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always valid")
                .and_utc();
            Ok(next)
        }
        _ => Err(anyhow!(
            "cron expression not supported: {cron_expr:?}. Supported: every minute/5/10/15/30 minutes, hourly, daily at midnight"
        )),
    }
}

/// Spawns the periodic trigger: on each firing, enqueue one import task per
/// configured feed, exactly like the manual trigger endpoint.
pub fn start_schedule(ctx: AppContext) {
    tokio::spawn(async move {
        let expr = ctx.settings.cron_schedule.clone();
        info!(schedule = %expr, "import schedule started");
        loop {
            let now = Utc::now();
            let next = match next_execution(&expr, now) {
                Ok(next) => next,
                Err(err) => {
                    error!("import schedule stopped: {err:#}");
                    return;
                }
            };
            let wait = (next - now).to_std().unwrap_or_default();
            sleep(wait).await;

            if ctx.settings.import_feeds.is_empty() {
                warn!("no feeds configured, skipping scheduled import");
                continue;
            }
            match queue::enqueue_feeds(&ctx.settings.import_feeds).await {
                Ok(tasks) => info!(feeds = tasks.len(), "scheduled import enqueued"),
                Err(err) => error!("scheduled enqueue failed: {err:#}"),
            }
        }
    });
}
