use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::SentinelError;
use crate::store::{bucket_start, normalize_ts, Comment, CommentStore, WindowMetrics};

// ─── Single-window accumulation ──────────────────────────────────

/// Running totals for one window. Folded over comments in
/// chronological order, then finalized into a metric record.
struct WindowAccumulator<'a> {
    total: u64,
    authors: HashSet<&'a str>,
    length_sum: f64,
    sentiment_sum: f64,
    sentiment_sq_sum: f64,
    gap_sum: f64,
    gap_sq_sum: f64,
    gap_count: u64,
    prev_published: Option<DateTime<Utc>>,
}

impl<'a> WindowAccumulator<'a> {
    fn new() -> Self {
        Self {
            total: 0,
            authors: HashSet::new(),
            length_sum: 0.0,
            sentiment_sum: 0.0,
            sentiment_sq_sum: 0.0,
            gap_sum: 0.0,
            gap_sq_sum: 0.0,
            gap_count: 0,
            prev_published: None,
        }
    }

    fn push(&mut self, comment: &'a Comment) {
        self.total += 1;
        self.authors.insert(comment.author_id.as_str());
        self.length_sum += comment.text.chars().count() as f64;

        let sentiment = comment.sentiment.unwrap_or(0.0);
        self.sentiment_sum += sentiment;
        self.sentiment_sq_sum += sentiment * sentiment;

        // The first comment of the window yields no gap.
        if let Some(prev) = self.prev_published {
            let gap = (comment.published_at - prev).num_seconds().max(0) as f64;
            self.gap_sum += gap;
            self.gap_sq_sum += gap * gap;
            self.gap_count += 1;
        }
        self.prev_published = Some(comment.published_at);
    }

    fn finalize(self, video_id: &str, window_start: DateTime<Utc>) -> WindowMetrics {
        if self.total == 0 {
            return WindowMetrics {
                video_id: video_id.to_string(),
                window_start,
                total_comments: 0,
                unique_authors: 0,
                avg_length: 0.0,
                avg_sentiment: 0.0,
                sentiment_variance: 0.0,
                avg_gap: 0.0,
                gap_variance: 0.0,
                coordination_score: None,
            };
        }

        let n = self.total as f64;
        let avg_sentiment = self.sentiment_sum / n;
        let (avg_gap, gap_variance) = if self.gap_count > 0 {
            let g = self.gap_count as f64;
            let mean = self.gap_sum / g;
            (mean, population_variance(self.gap_sq_sum / g, mean))
        } else {
            (0.0, 0.0)
        };

        WindowMetrics {
            video_id: video_id.to_string(),
            window_start,
            total_comments: self.total,
            unique_authors: self.authors.len() as u64,
            avg_length: self.length_sum / n,
            avg_sentiment,
            sentiment_variance: population_variance(self.sentiment_sq_sum / n, avg_sentiment),
            avg_gap,
            gap_variance,
            coordination_score: None,
        }
    }
}

/// `E[x²] − (E[x])²`, clamped at 0 to absorb floating-point
/// underflow on near-constant series.
fn population_variance(mean_of_squares: f64, mean: f64) -> f64 {
    (mean_of_squares - mean * mean).max(0.0)
}

/// Fold an already-chronological comment slice into one record.
pub fn compute_record(
    video_id: &str,
    window_start: DateTime<Utc>,
    comments: &[Comment],
) -> WindowMetrics {
    let mut acc = WindowAccumulator::new();
    for comment in comments {
        acc.push(comment);
    }
    acc.finalize(video_id, normalize_ts(window_start))
}

// ─── Store-backed forms ──────────────────────────────────────────

/// Metrics over `[window_start, window_end]` (inclusive) for one
/// video. A zero-volume range still yields a record, all fields 0.
pub async fn aggregate(
    store: &dyn CommentStore,
    video_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<WindowMetrics, SentinelError> {
    let comments = store
        .comments_in_range(video_id, window_start, window_end)
        .await?;
    Ok(compute_record(video_id, window_start, &comments))
}

/// The video's whole comment log bucketed into fixed `period_secs`
/// windows, ascending by window start. Gaps are computed per bucket,
/// so every record covers exactly the range it was evaluated over.
pub async fn aggregate_all(
    store: &dyn CommentStore,
    video_id: &str,
    period_secs: u64,
) -> Result<Vec<WindowMetrics>, SentinelError> {
    let comments = store.comments_for_video(video_id).await?;

    let mut records = Vec::new();
    let mut bucket: Vec<Comment> = Vec::new();
    let mut current_start: Option<DateTime<Utc>> = None;

    for comment in comments {
        let start = bucket_start(comment.published_at, period_secs);
        match current_start {
            Some(open) if open == start => bucket.push(comment),
            Some(open) => {
                records.push(compute_record(video_id, open, &bucket));
                bucket.clear();
                bucket.push(comment);
                current_start = Some(start);
            }
            None => {
                bucket.push(comment);
                current_start = Some(start);
            }
        }
    }
    if let Some(open) = current_start {
        records.push(compute_record(video_id, open, &bucket));
    }

    Ok(records)
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::store::memory::MemoryStore;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 26, 18, 10, 0).unwrap()
    }

    fn comment(id: &str, author: &str, text: &str, sentiment: f64, offset: i64) -> Comment {
        Comment {
            comment_id: id.into(),
            video_id: "vid".into(),
            author_id: author.into(),
            text: text.into(),
            sentiment: Some(sentiment),
            published_at: base() + Duration::seconds(offset),
            fetched_at: base(),
        }
    }

    #[test]
    fn empty_window_is_all_zeroes() {
        let record = compute_record("vid", base(), &[]);
        assert_eq!(record.total_comments, 0);
        assert_eq!(record.unique_authors, 0);
        assert_eq!(record.avg_length, 0.0);
        assert_eq!(record.avg_sentiment, 0.0);
        assert_eq!(record.sentiment_variance, 0.0);
        assert_eq!(record.avg_gap, 0.0);
        assert_eq!(record.gap_variance, 0.0);
        assert!(record.coordination_score.is_none());
    }

    #[test]
    fn gaps_come_from_consecutive_timestamps() {
        let comments = vec![
            comment("a", "u1", "first", 0.0, 0),
            comment("b", "u2", "second", 0.0, 10),
            comment("c", "u1", "third", 0.0, 30),
        ];
        let record = compute_record("vid", base(), &comments);

        assert_eq!(record.total_comments, 3);
        assert_eq!(record.unique_authors, 2);
        // Gaps 10 and 20: mean 15, population variance 25.
        assert!((record.avg_gap - 15.0).abs() < 1e-9);
        assert!((record.gap_variance - 25.0).abs() < 1e-9);
    }

    #[test]
    fn single_comment_has_no_gap() {
        let record = compute_record("vid", base(), &[comment("a", "u1", "only", 0.4, 0)]);
        assert_eq!(record.total_comments, 1);
        assert_eq!(record.unique_authors, 1);
        assert_eq!(record.avg_gap, 0.0);
        assert_eq!(record.gap_variance, 0.0);
    }

    #[test]
    fn empty_text_counts_with_length_zero() {
        let comments = vec![
            comment("a", "u1", "", 0.0, 0),
            comment("b", "u2", "abcd", 0.0, 5),
        ];
        let record = compute_record("vid", base(), &comments);
        assert_eq!(record.total_comments, 2);
        assert!((record.avg_length - 2.0).abs() < 1e-9);
    }

    #[test]
    fn sentiment_variance_is_population_and_clamped() {
        let comments = vec![
            comment("a", "u1", "x", 0.5, 0),
            comment("b", "u2", "x", -0.5, 5),
        ];
        let record = compute_record("vid", base(), &comments);
        assert!((record.avg_sentiment - 0.0).abs() < 1e-9);
        assert!((record.sentiment_variance - 0.25).abs() < 1e-9);

        // Identical sentiments must never go negative via underflow.
        let same = vec![
            comment("c", "u1", "x", 0.3, 0),
            comment("d", "u2", "x", 0.3, 5),
        ];
        assert!(compute_record("vid", base(), &same).sentiment_variance >= 0.0);
    }

    #[test]
    fn author_count_never_exceeds_total() {
        let comments = vec![
            comment("a", "u1", "x", 0.0, 0),
            comment("b", "u1", "y", 0.0, 5),
            comment("c", "u2", "z", 0.0, 9),
        ];
        let record = compute_record("vid", base(), &comments);
        assert!(record.unique_authors <= record.total_comments);
        assert!(record.unique_authors >= 1);
    }

    #[tokio::test]
    async fn insert_then_aggregate_round_trip() {
        let store = MemoryStore::new();
        store
            .insert_comments(&[comment("a", "u1", "hello there", 0.2, 42)])
            .await
            .unwrap();

        let record = aggregate(&store, "vid", base(), base() + Duration::seconds(600))
            .await
            .unwrap();
        assert!(record.total_comments >= 1);
    }

    #[tokio::test]
    async fn bulk_form_buckets_by_period_and_sorts() {
        let store = MemoryStore::new();
        // Two comments in the first 600 s bucket, one in the third.
        store
            .insert_comments(&[
                comment("a", "u1", "x", 0.0, 30),
                comment("b", "u2", "y", 0.0, 90),
                comment("c", "u3", "z", 0.0, 1250),
            ])
            .await
            .unwrap();

        let records = aggregate_all(&store, "vid", 600).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].window_start, base());
        assert_eq!(records[0].total_comments, 2);
        // 1250 s lands two buckets later.
        assert_eq!(records[1].window_start, base() + Duration::seconds(1200));
        assert_eq!(records[1].total_comments, 1);
        assert!(records[0].window_start < records[1].window_start);
        // Gaps never span buckets: the lone third comment has none.
        assert_eq!(records[1].avg_gap, 0.0);
    }
}
