use std::convert::Infallible;
use std::time::Duration;

use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::error;

use crate::constants::{DEFAULT_LIMIT, DEFAULT_PAGE, LIST_TIMEOUT_SECS, SSE_RETRY_MS};
use crate::context::AppContext;
use crate::models::NormalizedJob;
use crate::queue;
use crate::services::fetcher::{self, FeedSource};
use crate::services::normalizer;
use crate::stores::import_log_store::{self, HistoryFilter};

pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/import", web::post().to(trigger_import))
            .route("/history", web::get().to(history))
            .route("/progress", web::get().to(progress))
            .route("/jobs", web::get().to(live_jobs)),
    );
}

/// Manual trigger: enqueue one import task per configured feed.
pub async fn trigger_import(ctx: web::Data<AppContext>) -> impl Responder {
    let feeds = &ctx.settings.import_feeds;
    if feeds.is_empty() {
        return HttpResponse::BadRequest()
            .json(json!({"error": "No feeds configured in IMPORT_FEEDS"}));
    }
    match queue::enqueue_feeds(feeds).await {
        Ok(_) => HttpResponse::Ok().json(json!({"status": "enqueued", "feeds": feeds})),
        Err(err) => {
            error!("enqueue failed: {err:#}");
            HttpResponse::InternalServerError().json(json!({"error": "Job queue unavailable"}))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Import history, newest first, with pagination and started_at range filter.
pub async fn history(
    ctx: web::Data<AppContext>,
    query: web::Query<HistoryQuery>,
) -> impl Responder {
    let filter = HistoryFilter {
        page: query.page.unwrap_or(DEFAULT_PAGE),
        limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        start: query.start,
        end: query.end,
    };
    match import_log_store::history(&ctx.db, &filter).await {
        Ok(page) => HttpResponse::Ok().json(json!({"logs": page.logs, "total": page.total})),
        Err(err) => {
            error!("history query failed: {err:#}");
            HttpResponse::InternalServerError().json(json!({"error": err.to_string()}))
        }
    }
}

/// Live progress over SSE. The preamble advertises the reconnect interval;
/// after that every broadcaster event arrives as one `data:` frame. A lagged
/// subscriber just skips the events it missed.
pub async fn progress(ctx: web::Data<AppContext>) -> impl Responder {
    let rx = ctx.broadcaster.subscribe();
    let preamble = futures::stream::once(async {
        Ok::<_, Infallible>(web::Bytes::from(format!("retry: {SSE_RETRY_MS}\n\n")))
    });
    let events = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => serde_json::to_string(&event)
                .ok()
                .map(|payload| Ok(web::Bytes::from(format!("data: {payload}\n\n")))),
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        }
    });
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(preamble.chain(events))
}

/// Ad-hoc read path: fetch, parse and normalize every configured feed
/// without persisting anything.
pub async fn live_jobs(ctx: web::Data<AppContext>) -> impl Responder {
    let feeds = &ctx.settings.import_feeds;
    if feeds.is_empty() {
        return HttpResponse::BadRequest()
            .json(json!({"error": "No feeds configured in IMPORT_FEEDS"}));
    }
    let mut all_jobs = Vec::new();
    for url in feeds {
        match list_feed(ctx.feed_source.as_ref(), url).await {
            Ok(mut jobs) => all_jobs.append(&mut jobs),
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .json(json!({"error": err.to_string()}));
            }
        }
    }
    HttpResponse::Ok().json(json!({"jobs": all_jobs}))
}

async fn list_feed(source: &dyn FeedSource, url: &str) -> anyhow::Result<Vec<NormalizedJob>> {
    let body = source
        .fetch(url, Duration::from_secs(LIST_TIMEOUT_SECS))
        .await?;
    let tree = fetcher::parse_feed(&body)?;
    Ok(normalizer::normalize(&tree, url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::services::broadcaster::ProgressBroadcaster;
    use crate::services::fetcher::HttpFeedSource;
    use crate::stores::db;
    use actix_web::{test, App};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn test_ctx() -> AppContext {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::ensure_schema(&pool).await.unwrap();
        AppContext {
            db: pool,
            broadcaster: ProgressBroadcaster::new(8),
            feed_source: Arc::new(HttpFeedSource::new()),
            settings: Settings::default(),
        }
    }

    #[actix_web::test]
    async fn empty_history_returns_zero_rows_and_total() {
        let ctx = test_ctx().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(api_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/history").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 0);
        assert!(body["logs"].as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn import_without_feeds_is_a_validation_error() {
        let ctx = test_ctx().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(api_routes),
        )
        .await;
        let req = test::TestRequest::post().uri("/api/import").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn progress_stream_has_sse_content_type() {
        let ctx = test_ctx().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(api_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/progress").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
    }
}
