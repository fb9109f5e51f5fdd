use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use comment_sentinel::analysis::patterns::AlertPublisher;
use comment_sentinel::config::Config;
use comment_sentinel::handlers::ApiState;
use comment_sentinel::ops::OpsMetrics;
use comment_sentinel::poller::{self, MonitorContext};
use comment_sentinel::sentiment::HttpSentiment;
use comment_sentinel::server;
use comment_sentinel::source::youtube::YouTubeSource;
use comment_sentinel::store::redis::{self, RedisStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🛰️  COMMENT COORDINATION SENTINEL              ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Load configuration ────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sentinel.json"));
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let api_key = config
        .api_key
        .clone()
        .context("no API credential: set api_key or YOUTUBE_API_KEY")?;

    // ── 2. Connect to Redis ──────────────────────────────────────
    info!(url = %config.redis_url, "connecting to redis");
    let conn = redis::connect(&config.redis_url).await?;
    let store = Arc::new(RedisStore::new(conn));

    // ── 3. Build shared collaborators ────────────────────────────
    let ops = Arc::new(OpsMetrics::new());
    let (alerts_tx, _) = broadcast::channel(64);
    let publisher = Arc::new(AlertPublisher::new(config.alert_sink, alerts_tx.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctx = MonitorContext {
        store: store.clone(),
        source: Arc::new(YouTubeSource::new(api_key)),
        sentiment: Arc::new(HttpSentiment::new(&config.sentiment_url)),
        publisher,
        ops: ops.clone(),
        baseline_config: config.baseline(),
        poll_interval_secs: config.poll_interval_secs,
    };

    // ── 4. Spawn one monitor loop per video ──────────────────────
    let mut monitors = Vec::with_capacity(config.videos.len());
    for video_id in &config.videos {
        let ctx = ctx.clone();
        let video_id = video_id.clone();
        let shutdown = shutdown_rx.clone();
        monitors.push(tokio::spawn(async move {
            if let Err(e) = poller::run_video(ctx, video_id.clone(), shutdown).await {
                error!(%video_id, error = %e, "monitor loop terminated");
            }
        }));
    }

    // ── 5. Serve the operator API ────────────────────────────────
    let api_state = Arc::new(ApiState {
        store,
        ops,
        alerts: alerts_tx,
        videos: config.videos.clone(),
    });
    let app = server::create_router(api_state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    println!("Operator API listening on http://{}", config.listen_addr);
    println!("Status          → /api/status");
    println!("Window metrics  → /api/videos/:id/windows");
    println!("Author summary  → /api/videos/:id/authors");
    println!("Alert stream    → /api/alerts/stream");
    println!();

    let mut server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = server_shutdown.changed().await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %e, "operator API exited");
        }
    });

    // ── 6. Run until interrupted ─────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("interrupt received, finishing in-flight ticks");
    let _ = shutdown_tx.send(true);

    for monitor in monitors {
        let _ = monitor.await;
    }
    let _ = server_task.await;

    info!("shutdown complete");
    Ok(())
}
