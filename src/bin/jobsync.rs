// src/bin/jobsync.rs
use std::process;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use clap::{Arg, Command};
use tracing::info;
use tracing_subscriber::EnvFilter;

use jobsync::config::{self, Settings};
use jobsync::constants::EVENT_BUFFER;
use jobsync::context::AppContext;
use jobsync::cron::schedule::start_schedule;
use jobsync::queue;
use jobsync::routes::api::api_routes;
use jobsync::services::broadcaster::ProgressBroadcaster;
use jobsync::services::fetcher::HttpFeedSource;
use jobsync::stores::db;
use jobsync::workers::runner::{start_reclaimer, start_worker_pool};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let app = Command::new("jobsync")
        .version("0.1.0")
        .about("Job feed import pipeline (Actix + Redis + SQLite)")
        .subcommand(
            Command::new("serve")
                .about("Run the HTTP server, import workers and schedule")
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .help("Port to bind, overrides PORT from the environment"),
                ),
        )
        .subcommand(
            Command::new("import").about("Enqueue an import task for every configured feed"),
        );

    let matches = app.get_matches();
    let mut settings = Settings::from_env();

    match matches.subcommand() {
        Some(("serve", sub_matches)) => {
            if let Some(port) = sub_matches.get_one::<String>("port") {
                settings.port = port.parse()?;
            }
            serve(settings).await
        }
        Some(("import", _)) => import_once(settings).await,
        _ => {
            println!("No command specified. Use --help for usage information.");
            process::exit(1);
        }
    }
}

async fn serve(settings: Settings) -> Result<()> {
    config::set_settings(settings.clone())?;

    let db = db::connect(&settings.database_url).await?;
    let ctx = AppContext {
        db,
        broadcaster: ProgressBroadcaster::new(EVENT_BUFFER),
        feed_source: Arc::new(HttpFeedSource::new()),
        settings: settings.clone(),
    };

    start_worker_pool(ctx.clone(), settings.worker_concurrency);
    start_reclaimer();
    start_schedule(ctx.clone());

    info!("listening on port {}", settings.port);
    let data = web::Data::new(ctx);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(api_routes))
        .bind(("0.0.0.0", settings.port))?
        .run()
        .await?;
    Ok(())
}

async fn import_once(settings: Settings) -> Result<()> {
    config::set_settings(settings.clone())?;
    if settings.import_feeds.is_empty() {
        anyhow::bail!("No feeds configured in IMPORT_FEEDS");
    }
    let tasks = queue::enqueue_feeds(&settings.import_feeds).await?;
    println!("Enqueued {} import task(s)", tasks.len());
    Ok(())
}
