use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::ImportLog;

/// Status event pushed to live subscribers. Serialized form matches the SSE
/// payload: `{"status": "running" | "completed" | "failed", ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Running(ImportLog),
    Completed(ImportLog),
    Failed {
        #[serde(rename = "fileName")]
        file_name: String,
        error: String,
    },
}

/// Fan-out hub for import progress. Built on a broadcast channel so that
/// subscribe, unsubscribe (receiver drop) and publish are all safe under
/// concurrent use from workers and connecting observers; a slow or dropped
/// subscriber never blocks delivery to the rest.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Best-effort delivery to every live subscriber. Publishing with no
    /// subscribers is not an error.
    pub fn publish(&self, event: ProgressEvent) {
        match self.tx.send(event) {
            Ok(delivered) => debug!(subscribers = delivered, "progress event published"),
            Err(_) => debug!("progress event dropped, no subscribers"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
