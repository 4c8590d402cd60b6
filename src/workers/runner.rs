use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::constants::{IDLE_POLL_MS, RECLAIM_INTERVAL_SECS};
use crate::context::AppContext;
use crate::queue;
use crate::workers::import_worker;

/// Spawns a bounded pool of import workers. Each worker takes one task at a
/// time and runs it to completion, retries included, before polling again.
pub fn start_worker_pool(ctx: AppContext, concurrency: usize) {
    info!(concurrency, "import worker pool started");
    for worker_id in 0..concurrency {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            loop {
                let task = match queue::reserve().await {
                    Ok(Some(task)) => task,
                    Ok(None) => {
                        sleep(Duration::from_millis(IDLE_POLL_MS)).await;
                        continue;
                    }
                    Err(err) => {
                        debug!(worker_id, "queue unavailable: {err:#}");
                        sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };
                info!(worker_id, file = %task.file_name, "import task reserved");
                import_worker::run_import(&ctx, &task).await;
                if let Err(err) = queue::complete(&task).await {
                    warn!(worker_id, task_id = %task.id, "failed to ack task: {err:#}");
                }
            }
        });
    }
}

/// Returns tasks whose consumer lease lapsed back to the queue.
pub fn start_reclaimer() {
    tokio::spawn(async move {
        loop {
            match queue::reclaim_expired().await {
                Ok(0) => {}
                Ok(n) => info!(reclaimed = n, "abandoned tasks requeued"),
                Err(err) => debug!("reclaimer pass failed: {err:#}"),
            }
            sleep(Duration::from_secs(RECLAIM_INTERVAL_SECS)).await;
        }
    });
}
