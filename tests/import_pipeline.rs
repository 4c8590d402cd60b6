use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

use jobsync::config::Settings;
use jobsync::context::AppContext;
use jobsync::error::FetchError;
use jobsync::queue::ImportTask;
use jobsync::services::broadcaster::{ProgressBroadcaster, ProgressEvent};
use jobsync::services::fetcher::FeedSource;
use jobsync::stores::db;
use jobsync::stores::import_log_store::{self, HistoryFilter};
use jobsync::workers::import_worker::run_import;

const FEED_XML: &str = r#"
    <rss>
      <channel>
        <item>
          <guid>123</guid>
          <title>Test Job</title>
          <description>Test Desc</description>
          <link>https://example.com/job/123</link>
          <job:company>TestCo</job:company>
          <job:location>Remote</job:location>
          <pubDate>Wed, 17 Jul 2024 12:00:00 GMT</pubDate>
        </item>
      </channel>
    </rss>
"#;

/// Serves a canned body after failing a scripted number of times.
struct ScriptedSource {
    body: String,
    fail_first: usize,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(body: &str, fail_first: usize) -> Self {
        Self {
            body: body.to_string(),
            fail_first,
            calls: AtomicUsize::new(0),
        }
    }

    fn always_failing() -> Self {
        Self::new("", usize::MAX)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        Ok(self.body.clone())
    }
}

async fn mem_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::ensure_schema(&pool).await.unwrap();
    pool
}

fn test_ctx(pool: SqlitePool, source: Arc<ScriptedSource>) -> AppContext {
    AppContext {
        db: pool,
        broadcaster: ProgressBroadcaster::new(64),
        feed_source: source,
        settings: Settings::default(),
    }
}

fn drain(rx: &mut Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
    events
}

fn completed_logs(events: &[ProgressEvent]) -> Vec<&jobsync::models::ImportLog> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Completed(log) => Some(log),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn successful_run_counts_new_jobs() {
    let source = Arc::new(ScriptedSource::new(FEED_XML, 0));
    let ctx = test_ctx(mem_pool().await, source.clone());
    let mut rx = ctx.broadcaster.subscribe();

    let task = ImportTask::new("https://jobs.example/feed", "https://jobs.example/feed");
    run_import(&ctx, &task).await;

    let events = drain(&mut rx);
    let completed = completed_logs(&events);
    assert_eq!(completed.len(), 1);
    let log = completed[0];
    assert_eq!(log.total, 1);
    assert_eq!(log.new_count, 1);
    assert_eq!(log.updated_count, 0);
    assert_eq!(log.failed_count, 0);
    assert!(log.ended_at.is_some());
    assert_eq!(source.calls(), 1);

    // A running event precedes the completed one.
    assert!(matches!(events[0], ProgressEvent::Running(_)));

    let external_id: String = sqlx::query_scalar("SELECT external_id FROM jobs")
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(external_id, "123");
}

#[tokio::test]
async fn rerunning_unchanged_feed_counts_updates_not_duplicates() {
    let source = Arc::new(ScriptedSource::new(FEED_XML, 0));
    let ctx = test_ctx(mem_pool().await, source);
    let mut rx = ctx.broadcaster.subscribe();

    let task = ImportTask::new("https://jobs.example/feed", "https://jobs.example/feed");
    run_import(&ctx, &task).await;
    run_import(&ctx, &task).await;

    let events = drain(&mut rx);
    let completed = completed_logs(&events);
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0].new_count, 1);
    assert_eq!(completed[1].new_count, 0);
    assert_eq!(completed[1].updated_count, 1);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn bad_record_is_counted_without_aborting_the_run() {
    let xml = r#"
        <rss><channel>
          <item><guid>ok-1</guid><title>Good</title></item>
          <item><title>No identity at all</title></item>
        </channel></rss>
    "#;
    let ctx = test_ctx(mem_pool().await, Arc::new(ScriptedSource::new(xml, 0)));
    let mut rx = ctx.broadcaster.subscribe();

    run_import(&ctx, &ImportTask::new("u", "u")).await;

    let events = drain(&mut rx);
    let completed = completed_logs(&events);
    assert_eq!(completed.len(), 1);
    let log = completed[0];
    assert_eq!(log.total, 2);
    assert_eq!(log.new_count, 1);
    assert_eq!(log.failed_count, 1);
    assert_eq!(log.new_count + log.updated_count + log.failed_count, log.total);
}

#[tokio::test]
async fn transient_failures_retry_then_converge() {
    let source = Arc::new(ScriptedSource::new(FEED_XML, 2));
    let ctx = test_ctx(mem_pool().await, source.clone());
    let mut rx = ctx.broadcaster.subscribe();

    // Real time: sqlx-sqlite acquires round-trip through a worker thread, so
    // paused tokio time auto-advances the pool's acquire-timeout timer and
    // breaks both the pool and the elapsed measurements.
    let started = tokio::time::Instant::now();
    run_import(&ctx, &ImportTask::new("u", "u")).await;
    let elapsed = started.elapsed();

    // Two failed attempts back off 1s then 2s before the third succeeds.
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
    assert_eq!(source.calls(), 3);

    let events = drain(&mut rx);
    assert_eq!(completed_logs(&events).len(), 1);
    assert!(!events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Failed { .. })));

    // Rolled-back attempts leave no audit rows; only the committed run shows.
    let page = import_log_store::history(&ctx.db, &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn exhausted_retries_publish_failed_and_keep_one_log_row() {
    let source = Arc::new(ScriptedSource::always_failing());
    let ctx = test_ctx(mem_pool().await, source.clone());
    let mut rx = ctx.broadcaster.subscribe();

    // Real time for the same reason as transient_failures_retry_then_converge.
    let started = tokio::time::Instant::now();
    run_import(&ctx, &ImportTask::new("https://down.example/feed", "down-feed")).await;
    let elapsed = started.elapsed();

    // Five attempts with backoffs of 1, 2, 4 and 8 seconds between them.
    assert_eq!(source.calls(), 5);
    assert!(elapsed >= Duration::from_secs(15), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(20), "elapsed {elapsed:?}");

    let events = drain(&mut rx);
    assert!(completed_logs(&events).is_empty());
    let failed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Failed { file_name, error } => Some((file_name, error)),
            _ => None,
        })
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "down-feed");
    assert!(failed[0].1.contains("HTTP 503"), "error was {:?}", failed[0].1);

    // The rolled-back attempts vanish; one finalized row records the failure.
    let page = import_log_store::history(&ctx.db, &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    let log = &page.logs[0];
    assert!(log.ended_at.is_some());
    assert_eq!(log.total, 0);
    assert_eq!(log.new_count + log.updated_count + log.failed_count, log.total);

    // Job writes from failed attempts were rolled back too.
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn unparsable_payload_is_an_attempt_failure() {
    let ctx = test_ctx(
        mem_pool().await,
        Arc::new(ScriptedSource::new("this is not a feed", 0)),
    );
    let mut rx = ctx.broadcaster.subscribe();

    tokio::time::pause();
    run_import(&ctx, &ImportTask::new("u", "bad-feed")).await;

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Failed { .. })));
    assert!(completed_logs(&events).is_empty());
}

#[tokio::test]
async fn every_finalized_log_satisfies_the_accounting_invariant() {
    let source = Arc::new(ScriptedSource::new(FEED_XML, 0));
    let ctx = test_ctx(mem_pool().await, source);
    for _ in 0..3 {
        run_import(&ctx, &ImportTask::new("u", "u")).await;
    }
    let page = import_log_store::history(&ctx.db, &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    for log in &page.logs {
        assert!(log.ended_at.is_some());
        assert_eq!(log.new_count + log.updated_count + log.failed_count, log.total);
    }
}
