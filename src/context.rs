use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Settings;
use crate::services::broadcaster::ProgressBroadcaster;
use crate::services::fetcher::FeedSource;

/// Everything the HTTP handlers, workers and scheduler share.
#[derive(Clone)]
pub struct AppContext {
    pub db: SqlitePool,
    pub broadcaster: ProgressBroadcaster,
    pub feed_source: Arc<dyn FeedSource>,
    pub settings: Settings,
}
