use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod middleware;
mod modules;
mod routes;
mod state;
#[cfg(test)]
mod test_support;
mod workers;

use config::settings::AppConfig;
use infrastructure::db::pool::{connect_to_db, run_migrations};
use infrastructure::redis::client::RedisService;
use modules::media::repository::VideoStatusRepository;
use state::AppState;
use workers::encoding_queue::{EncodingQueue, QueueOptions};
use workers::recovery::recover_jobs;
use workers::transcoder::FfmpegTranscoder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("Missing required environment variable")?;
    config
        .media
        .ensure_dirs()
        .await
        .context("Failed to create upload directories")?;

    let pool = connect_to_db(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;

    let redis = RedisService::new(&config.redis_url).context("Invalid REDIS_URL")?;
    redis.ping().await.context("Failed to connect to Redis")?;

    let status = Arc::new(VideoStatusRepository::new(pool));
    let transcoder = Arc::new(FfmpegTranscoder::new(&config.media));
    let queue = EncodingQueue::new(
        status.clone(),
        transcoder,
        QueueOptions::from(&config.media),
    );

    recover_jobs(status.as_ref(), &queue, &config.media.temp_dir)
        .await
        .context("Failed to recover encoding jobs")?;

    let port = config.server_port;
    let grace = Duration::from_secs(config.media.shutdown_grace_secs);
    let state = AppState::new(config, status, queue.clone(), Arc::new(redis));
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Waiting up to {}s for the encoding queue to drain", grace.as_secs());
    if tokio::time::timeout(grace, queue.wait_idle()).await.is_err() {
        warn!(
            "Encoding queue still busy at shutdown; interrupted jobs will be failed on next start"
        );
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
