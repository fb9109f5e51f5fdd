use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::analysis::baseline::BaselineConfig;
use crate::analysis::patterns::{self, AlertPublisher};
use crate::analysis::{aggregator, RollingBaseline};
use crate::error::SentinelError;
use crate::ops::OpsMetrics;
use crate::replay;
use crate::sentiment::{scalar, SentimentModel};
use crate::source::{fetch_until, CommentSource, SourceItem};
use crate::store::{normalize_ts, Comment, CommentStore};

// ─── Shared context ──────────────────────────────────────────────

/// Collaborators handed to every per-video monitor task. Everything
/// mutable (baseline, cursor state) stays task-local; only the store
/// and the metric/alert fan-out are shared.
#[derive(Clone)]
pub struct MonitorContext {
    pub store: Arc<dyn CommentStore>,
    pub source: Arc<dyn CommentSource>,
    pub sentiment: Arc<dyn SentimentModel>,
    pub publisher: Arc<AlertPublisher>,
    pub ops: Arc<OpsMetrics>,
    pub baseline_config: BaselineConfig,
    pub poll_interval_secs: u64,
}

/// Per-video cursor state, owned by the video's task.
#[derive(Debug, Clone)]
pub struct VideoState {
    /// Newest comment id fetched so far; pagination stops here.
    pub latest_seen_id: Option<String>,
    /// Wall-clock start of the window the next tick will evaluate.
    pub last_window_start: DateTime<Utc>,
}

// ─── Entry point ─────────────────────────────────────────────────

/// One video's whole monitoring lifetime: historical backfill and
/// baseline warm-up, then the live polling loop until shutdown.
///
/// Only a store failure ends the loop early; fetch and sentiment
/// trouble is absorbed per-tick.
pub async fn run_video(
    ctx: MonitorContext,
    video_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SentinelError> {
    let mut baseline = RollingBaseline::new(ctx.baseline_config);
    let mut state = startup(&ctx, &video_id, &mut baseline).await?;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let tick_started = Instant::now();
        tick(&ctx, &video_id, &mut baseline, &mut state).await?;
        ctx.ops.record_tick(tick_started.elapsed().as_millis() as u64);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(ctx.poll_interval_secs)) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(%video_id, "monitor loop stopped");
    Ok(())
}

// ─── Startup: backfill + replay ──────────────────────────────────

/// Fetch the video's full comment history, persist it with sentiment
/// attached, and replay it through the baseline. A failed history
/// fetch is logged and skipped: replay still runs over whatever the
/// store already holds, and the next tick retries from scratch.
pub async fn startup(
    ctx: &MonitorContext,
    video_id: &str,
    baseline: &mut RollingBaseline,
) -> Result<VideoState, SentinelError> {
    let mut latest_seen_id = None;

    match fetch_until(ctx.source.as_ref(), video_id, None).await {
        Ok(items) if !items.is_empty() => {
            latest_seen_id = Some(items[0].comment_id.clone());
            let inserted = persist_items(ctx, video_id, items).await?;
            info!(video_id, inserted, "historical backfill complete");
        }
        Ok(_) => info!(video_id, "no historical comments upstream"),
        Err(e) => {
            ctx.ops.inc_fetch_errors();
            warn!(video_id, error = %e, "historical fetch failed; replaying persisted data only");
        }
    }

    replay::replay(
        ctx.store.as_ref(),
        baseline,
        &ctx.publisher,
        video_id,
        ctx.poll_interval_secs,
    )
    .await?;

    Ok(VideoState {
        latest_seen_id,
        last_window_start: normalize_ts(Utc::now()),
    })
}

// ─── One live tick ───────────────────────────────────────────────

/// Fetch → sentiment → persist → aggregate → evaluate → classify →
/// upsert → update → advance. A fetch error skips the whole tick
/// with the cursor state untouched, so the next tick retries from
/// the same point.
pub async fn tick(
    ctx: &MonitorContext,
    video_id: &str,
    baseline: &mut RollingBaseline,
    state: &mut VideoState,
) -> Result<(), SentinelError> {
    let fetch_started = Instant::now();
    let fetched = match fetch_until(
        ctx.source.as_ref(),
        video_id,
        state.latest_seen_id.as_deref(),
    )
    .await
    {
        Ok(items) => items,
        Err(e) => {
            ctx.ops.inc_fetch_errors();
            warn!(video_id, error = %e, "fetch failed, skipping tick");
            return Ok(());
        }
    };
    ctx.ops
        .record_fetch(fetch_started.elapsed().as_millis() as u64);

    let window_end = normalize_ts(Utc::now());

    if let Some(newest) = fetched.first() {
        state.latest_seen_id = Some(newest.comment_id.clone());
        let inserted = persist_items(ctx, video_id, fetched).await?;
        ctx.ops.add_ingested(inserted as u64);
    }

    let mut record =
        aggregator::aggregate(ctx.store.as_ref(), video_id, state.last_window_start, window_end)
            .await?;

    if record.total_comments > 0 {
        if let Some(z) = baseline.evaluate(&record) {
            let score = baseline.coordination_score(&z);
            record.coordination_score = Some(score);
            ctx.ops.inc_windows_scored();

            let alerts = patterns::classify(&z, &record);
            if !alerts.is_empty() {
                let report = patterns::build_report(
                    ctx.store.as_ref(),
                    &record,
                    &z,
                    alerts,
                    score,
                    ctx.poll_interval_secs,
                )
                .await?;
                ctx.ops.add_alerts(report.alerts.len() as u64);
                ctx.publisher.publish(&report);
            }
        }
        ctx.store.upsert_window(&record).await?;
        baseline.update(&record);
    }

    state.last_window_start = window_end;
    Ok(())
}

// ─── Ingest helpers ──────────────────────────────────────────────

async fn persist_items(
    ctx: &MonitorContext,
    video_id: &str,
    items: Vec<SourceItem>,
) -> Result<usize, SentinelError> {
    let fetched_at = normalize_ts(Utc::now());
    let mut comments: Vec<Comment> = items
        .into_iter()
        .map(|item| Comment {
            comment_id: item.comment_id,
            video_id: video_id.to_string(),
            author_id: item.author_id,
            text: item.text,
            sentiment: None,
            published_at: normalize_ts(item.published_at),
            fetched_at,
        })
        .collect();

    apply_sentiment(ctx.sentiment.as_ref(), &mut comments).await;
    ctx.store.insert_comments(&comments).await
}

/// Attach a sentiment to every comment. Non-empty texts go through
/// the model in one batch; empty or whitespace-only text scores 0.0,
/// and so does the whole batch if inference fails.
async fn apply_sentiment(model: &dyn SentimentModel, comments: &mut [Comment]) {
    for comment in comments.iter_mut() {
        comment.sentiment = Some(0.0);
    }

    let scored: Vec<usize> = comments
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.text.trim().is_empty())
        .map(|(i, _)| i)
        .collect();
    if scored.is_empty() {
        return;
    }

    let texts: Vec<String> = scored.iter().map(|&i| comments[i].text.clone()).collect();
    match model.score_batch(&texts).await {
        Ok(outcomes) if outcomes.len() == texts.len() => {
            for (&i, outcome) in scored.iter().zip(&outcomes) {
                comments[i].sentiment = Some(scalar(outcome));
            }
        }
        Ok(outcomes) => warn!(
            expected = texts.len(),
            got = outcomes.len(),
            "sentiment batch size mismatch, defaulting to 0.0"
        ),
        Err(e) => warn!(error = %e, "sentiment inference failed, defaulting to 0.0"),
    }
}

// ─── Tests ───────────────────────────────────────────────────────
