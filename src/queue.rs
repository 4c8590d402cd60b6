use nanoid::nanoid;
use redis::{AsyncCommands, Direction};
use serde::{Deserialize, Serialize};
use serde_json::to_string;
use tracing::{debug, warn};

use crate::constants::{LEASE_SECS, PREFIX_LEASE, PROCESSING_KEY, QUEUE_KEY};
use crate::rdconfig::get_redis_conn;

/// Queue message for one feed import. Lives from enqueue until the worker
/// acks it (or its lease expires and it is redelivered).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportTask {
    pub id: String,
    pub url: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

impl ImportTask {
    pub fn new(url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id: nanoid!(10),
            url: url.into(),
            file_name: file_name.into(),
        }
    }
}

fn lease_key(task_id: &str) -> String {
    format!("{PREFIX_LEASE}:{task_id}")
}

pub async fn enqueue(task: &ImportTask) -> anyhow::Result<()> {
    let mut conn = get_redis_conn().await?;
    let payload = to_string(task)?;
    conn.rpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
    debug!(task_id = %task.id, url = %task.url, "import task enqueued");
    Ok(())
}

/// Enqueues one task per feed, using the feed URL as the run label.
pub async fn enqueue_feeds(feeds: &[String]) -> anyhow::Result<Vec<ImportTask>> {
    let mut tasks = Vec::with_capacity(feeds.len());
    for url in feeds {
        let task = ImportTask::new(url.clone(), url.clone());
        enqueue(&task).await?;
        tasks.push(task);
    }
    Ok(tasks)
}

/// Takes the next task, moving it to the processing list and granting this
/// consumer a lease. A task whose lease lapses before `complete` is eligible
/// for redelivery, which makes delivery at-least-once.
pub async fn reserve() -> anyhow::Result<Option<ImportTask>> {
    let mut conn = get_redis_conn().await?;
    let payload: Option<String> = conn
        .lmove(QUEUE_KEY, PROCESSING_KEY, Direction::Left, Direction::Right)
        .await?;
    let Some(payload) = payload else {
        return Ok(None);
    };
    let task: ImportTask = match serde_json::from_str(&payload) {
        Ok(task) => task,
        Err(err) => {
            warn!("discarding malformed task payload: {err}");
            conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
            return Ok(None);
        }
    };
    conn.set_ex::<_, _, ()>(lease_key(&task.id), &payload, LEASE_SECS)
        .await?;
    Ok(Some(task))
}

/// Acks a processed task: drops it from the processing list and releases
/// the lease.
pub async fn complete(task: &ImportTask) -> anyhow::Result<()> {
    let mut conn = get_redis_conn().await?;
    let payload = to_string(task)?;
    conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
    conn.del::<_, ()>(lease_key(&task.id)).await?;
    Ok(())
}

/// Returns lease-expired tasks from the processing list to the queue.
/// Run periodically by the reclaimer loop.
pub async fn reclaim_expired() -> anyhow::Result<usize> {
    let mut conn = get_redis_conn().await?;
    let held: Vec<String> = conn.lrange(PROCESSING_KEY, 0, -1).await?;
    let mut reclaimed = 0;
    for payload in held {
        let task: ImportTask = match serde_json::from_str(&payload) {
            Ok(task) => task,
            Err(_) => {
                conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
                continue;
            }
        };
        let leased: bool = conn.exists(lease_key(&task.id)).await?;
        if !leased {
            conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
            conn.rpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
            warn!(task_id = %task.id, file = %task.file_name, "lease expired, task returned to queue");
            reclaimed += 1;
        }
    }
    Ok(reclaimed)
}
