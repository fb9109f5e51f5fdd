pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SentinelError;

// ─── Domain rows ─────────────────────────────────────────────────

/// One ingested comment. Immutable after insert; `sentiment` is
/// attached exactly once, before the row ever reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,
    pub video_id: String,
    pub author_id: String,
    pub text: String,
    pub sentiment: Option<f64>,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// Derived metrics for one `(video_id, window_start)` window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub video_id: String,
    pub window_start: DateTime<Utc>,
    pub total_comments: u64,
    pub unique_authors: u64,
    pub avg_length: f64,
    pub avg_sentiment: f64,
    pub sentiment_variance: f64,
    pub avg_gap: f64,
    pub gap_variance: f64,
    /// Absent until the baseline has enough history to score.
    pub coordination_score: Option<f64>,
}

/// Per-author behavioral rollup served by the operator API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorSummary {
    pub author_id: String,
    pub total_comments: u64,
    pub avg_sentiment: f64,
    pub min_sentiment: f64,
    pub max_sentiment: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// ─── Timestamp normalization ─────────────────────────────────────

/// Truncate to whole seconds. Every timestamp is normalized through
/// here before it is written or used as a window key, so range
/// queries always compare like with like.
pub fn normalize_ts(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0).single().unwrap_or(ts)
}

/// ISO-8601 UTC at second precision, e.g. `2026-02-26T18:10:00Z`.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| normalize_ts(dt.with_timezone(&Utc)))
}

/// Floor `ts` to the start of its `period_secs` bucket.
pub fn bucket_start(ts: DateTime<Utc>, period_secs: u64) -> DateTime<Utc> {
    let period = period_secs.max(1) as i64;
    let floored = ts.timestamp().div_euclid(period) * period;
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}

// ─── Store contract ──────────────────────────────────────────────

/// Persistence seam shared by every pipeline component.
///
/// Semantics both implementations must honor:
/// - comments are append-only, keyed by `comment_id`; duplicate
///   inserts are silent no-ops;
/// - comment reads come back ascending by `(published_at,
///   comment_id)` with inclusive range bounds;
/// - window metrics upsert on `(video_id, window_start)`, replacing
///   every derived field from the new row.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Bulk insert. Returns how many rows were actually new.
    async fn insert_comments(&self, comments: &[Comment]) -> Result<usize, SentinelError>;

    /// Comments for `video_id` with `published_at` in `[start, end]`.
    async fn comments_in_range(
        &self,
        video_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Comment>, SentinelError>;

    /// The video's entire comment log, ascending.
    async fn comments_for_video(&self, video_id: &str) -> Result<Vec<Comment>, SentinelError>;

    async fn upsert_window(&self, record: &WindowMetrics) -> Result<(), SentinelError>;

    /// Persisted window metrics for `video_id`, ascending by start.
    async fn windows_for_video(&self, video_id: &str)
        -> Result<Vec<WindowMetrics>, SentinelError>;

    /// Per-author rollups, descending by comment count.
    async fn author_summaries(&self, video_id: &str)
        -> Result<Vec<AuthorSummary>, SentinelError>;
}

/// Fold a video's comments into per-author summaries, descending by
/// count. Shared by both store implementations.
pub(crate) fn summarize_authors(comments: &[Comment]) -> Vec<AuthorSummary> {
    use std::collections::HashMap;

    let mut by_author: HashMap<&str, AuthorSummary> = HashMap::new();
    for comment in comments {
        let sentiment = comment.sentiment.unwrap_or(0.0);
        let entry = by_author
            .entry(comment.author_id.as_str())
            .or_insert_with(|| AuthorSummary {
                author_id: comment.author_id.clone(),
                total_comments: 0,
                avg_sentiment: 0.0,
                min_sentiment: f64::INFINITY,
                max_sentiment: f64::NEG_INFINITY,
                first_seen: comment.published_at,
                last_seen: comment.published_at,
            });
        entry.total_comments += 1;
        // avg_sentiment accumulates the sum here; divided below.
        entry.avg_sentiment += sentiment;
        entry.min_sentiment = entry.min_sentiment.min(sentiment);
        entry.max_sentiment = entry.max_sentiment.max(sentiment);
        entry.first_seen = entry.first_seen.min(comment.published_at);
        entry.last_seen = entry.last_seen.max(comment.published_at);
    }

    let mut summaries: Vec<AuthorSummary> = by_author
        .into_values()
        .map(|mut s| {
            s.avg_sentiment /= s.total_comments as f64;
            s
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.total_comments
            .cmp(&a.total_comments)
            .then_with(|| a.author_id.cmp(&b.author_id))
    });
    summaries
}

// ─── Tests ───────────────────────────────────────────────────────
