use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use async_trait::async_trait;

use super::{
    normalize_ts, summarize_authors, AuthorSummary, Comment, CommentStore, WindowMetrics,
};
use crate::error::SentinelError;

// ─── In-memory store ─────────────────────────────────────────────

/// Store with the same contract as the Redis implementation, held in
/// process memory. Used by the test suite and for offline runs
/// against the scripted source.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// comment_id → row.
    comments: BTreeMap<String, Comment>,
    /// (video_id, window_start) → row.
    windows: BTreeMap<(String, DateTime<Utc>), WindowMetrics>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn video_comments(inner: &Inner, video_id: &str) -> Vec<Comment> {
        let mut rows: Vec<Comment> = inner
            .comments
            .values()
            .filter(|c| c.video_id == video_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.comment_id.cmp(&b.comment_id))
        });
        rows
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn insert_comments(&self, comments: &[Comment]) -> Result<usize, SentinelError> {
        let mut inner = self.inner.lock();
        let mut inserted = 0;
        for comment in comments {
            if inner.comments.contains_key(&comment.comment_id) {
                continue;
            }
            let mut row = comment.clone();
            row.published_at = normalize_ts(row.published_at);
            row.fetched_at = normalize_ts(row.fetched_at);
            inner.comments.insert(row.comment_id.clone(), row);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn comments_in_range(
        &self,
        video_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Comment>, SentinelError> {
        let (start, end) = (normalize_ts(start), normalize_ts(end));
        let inner = self.inner.lock();
        Ok(Self::video_comments(&inner, video_id)
            .into_iter()
            .filter(|c| c.published_at >= start && c.published_at <= end)
            .collect())
    }

    async fn comments_for_video(&self, video_id: &str) -> Result<Vec<Comment>, SentinelError> {
        let inner = self.inner.lock();
        Ok(Self::video_comments(&inner, video_id))
    }

    async fn upsert_window(&self, record: &WindowMetrics) -> Result<(), SentinelError> {
        let mut row = record.clone();
        row.window_start = normalize_ts(row.window_start);
        let key = (row.video_id.clone(), row.window_start);
        self.inner.lock().windows.insert(key, row);
        Ok(())
    }

    async fn windows_for_video(
        &self,
        video_id: &str,
    ) -> Result<Vec<WindowMetrics>, SentinelError> {
        let inner = self.inner.lock();
        Ok(inner
            .windows
            .range((video_id.to_string(), DateTime::<Utc>::MIN_UTC)..)
            .take_while(|((vid, _), _)| vid == video_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn author_summaries(
        &self,
        video_id: &str,
    ) -> Result<Vec<AuthorSummary>, SentinelError> {
        let inner = self.inner.lock();
        Ok(summarize_authors(&Self::video_comments(&inner, video_id)))
    }
}

// ─── Tests ───────────────────────────────────────────────────────
