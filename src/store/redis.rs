use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use super::{
    format_ts, normalize_ts, parse_ts, summarize_authors, AuthorSummary, Comment, CommentStore,
    WindowMetrics,
};
use crate::error::SentinelError;

// ─── Connection ──────────────────────────────────────────────────

/// Creates a single `ConnectionManager` that auto-reconnects on
/// failure. Clones share the same multiplexed TCP connection, which
/// is enough for the single-writer/many-reader pattern here. Enable
/// `appendonly yes` on the server so the comment log survives
/// restarts as an actual append-only journal.
pub async fn connect(url: &str) -> Result<ConnectionManager, SentinelError> {
    let client = redis::Client::open(url)
        .map_err(|e| SentinelError::Store(format!("invalid redis url {url:?}: {e}")))?;
    ConnectionManager::new(client)
        .await
        .map_err(|e| SentinelError::Store(format!("cannot connect to redis at {url}: {e}")))
}

// ─── Key layout ──────────────────────────────────────────────────
//
//   comment:{comment_id}          HASH   one comment row
//   video:{video_id}:comments     ZSET   comment_id scored by epoch(published_at)
//   window:{video_id}:{iso}       HASH   one window-metrics row
//   video:{video_id}:windows      ZSET   iso window_start scored by epoch

fn comment_key(comment_id: &str) -> String {
    format!("comment:{comment_id}")
}
fn comment_index_key(video_id: &str) -> String {
    format!("video:{video_id}:comments")
}
fn window_key(video_id: &str, window_start: DateTime<Utc>) -> String {
    format!("window:{video_id}:{}", format_ts(window_start))
}
fn window_index_key(video_id: &str) -> String {
    format!("video:{video_id}:windows")
}

// ─── Store ───────────────────────────────────────────────────────

/// Redis-backed implementation of the persistence contract.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn hydrate_comments(&self, ids: &[String]) -> Result<Vec<Comment>, SentinelError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for id in ids {
            pipe.cmd("HGETALL").arg(comment_key(id));
        }
        let maps: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        let mut rows = Vec::with_capacity(ids.len());
        for (id, map) in ids.iter().zip(maps) {
            match comment_from_map(id, &map) {
                Some(row) => rows.push(row),
                // Index entry without a hash: tolerate and move on.
                None => warn!(comment_id = %id, "skipping unreadable comment row"),
            }
        }
        rows.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.comment_id.cmp(&b.comment_id))
        });
        Ok(rows)
    }
}

#[async_trait]
impl CommentStore for RedisStore {
    async fn insert_comments(&self, comments: &[Comment]) -> Result<usize, SentinelError> {
        if comments.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for comment in comments {
            let published = normalize_ts(comment.published_at);
            let fetched = normalize_ts(comment.fetched_at);

            // NX makes the index entry the authoritative dedup check;
            // re-writing the hash with identical values is harmless
            // because comment rows are immutable.
            pipe.cmd("ZADD")
                .arg(comment_index_key(&comment.video_id))
                .arg("NX")
                .arg(published.timestamp())
                .arg(&comment.comment_id);

            let mut hset = redis::cmd("HSET");
            hset.arg(comment_key(&comment.comment_id))
                .arg("video_id")
                .arg(&comment.video_id)
                .arg("author_id")
                .arg(&comment.author_id)
                .arg("text")
                .arg(&comment.text)
                .arg("published_at")
                .arg(format_ts(published))
                .arg("fetched_at")
                .arg(format_ts(fetched));
            if let Some(sentiment) = comment.sentiment {
                hset.arg("sentiment").arg(sentiment);
            }
            pipe.add_command(hset).ignore();
        }

        let added: Vec<i64> = pipe.query_async(&mut conn).await?;
        Ok(added.into_iter().map(|n| n.max(0) as usize).sum())
    }

    async fn comments_in_range(
        &self,
        video_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Comment>, SentinelError> {
        let (start, end) = (normalize_ts(start), normalize_ts(end));
        let mut conn = self.conn.clone();
        // ZRANGEBYSCORE is inclusive on both bounds, matching the
        // window contract.
        let ids: Vec<String> = conn
            .zrangebyscore(comment_index_key(video_id), start.timestamp(), end.timestamp())
            .await?;
        self.hydrate_comments(&ids).await
    }

    async fn comments_for_video(&self, video_id: &str) -> Result<Vec<Comment>, SentinelError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrange(comment_index_key(video_id), 0, -1).await?;
        self.hydrate_comments(&ids).await
    }

    async fn upsert_window(&self, record: &WindowMetrics) -> Result<(), SentinelError> {
        let window_start = normalize_ts(record.window_start);
        let key = window_key(&record.video_id, window_start);

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.cmd("ZADD")
            .arg(window_index_key(&record.video_id))
            .arg(window_start.timestamp())
            .arg(format_ts(window_start))
            .ignore();

        let mut hset = redis::cmd("HSET");
        hset.arg(&key)
            .arg("total_comments")
            .arg(record.total_comments)
            .arg("unique_authors")
            .arg(record.unique_authors)
            .arg("avg_length")
            .arg(record.avg_length)
            .arg("avg_sentiment")
            .arg(record.avg_sentiment)
            .arg("sentiment_variance")
            .arg(record.sentiment_variance)
            .arg("avg_gap")
            .arg(record.avg_gap)
            .arg("gap_variance")
            .arg(record.gap_variance);
        match record.coordination_score {
            Some(score) => {
                hset.arg("coordination_score").arg(score);
                pipe.add_command(hset).ignore();
            }
            None => {
                pipe.add_command(hset).ignore();
                // The upsert replaces every derived field; a scoreless
                // row must not inherit a previous score.
                pipe.cmd("HDEL").arg(&key).arg("coordination_score").ignore();
            }
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn windows_for_video(
        &self,
        video_id: &str,
    ) -> Result<Vec<WindowMetrics>, SentinelError> {
        let mut conn = self.conn.clone();
        let starts: Vec<String> = conn.zrange(window_index_key(video_id), 0, -1).await?;
        if starts.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for iso in &starts {
            pipe.cmd("HGETALL").arg(format!("window:{video_id}:{iso}"));
        }
        let maps: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        let mut rows = Vec::with_capacity(starts.len());
        for (iso, map) in starts.iter().zip(maps) {
            match window_from_map(video_id, iso, &map) {
                Some(row) => rows.push(row),
                None => warn!(video_id, window_start = %iso, "skipping unreadable window row"),
            }
        }
        Ok(rows)
    }

    async fn author_summaries(
        &self,
        video_id: &str,
    ) -> Result<Vec<AuthorSummary>, SentinelError> {
        let comments = self.comments_for_video(video_id).await?;
        Ok(summarize_authors(&comments))
    }
}

// ─── Hash hydration ──────────────────────────────────────────────

fn comment_from_map(comment_id: &str, map: &HashMap<String, String>) -> Option<Comment> {
    if map.is_empty() {
        return None;
    }
    Some(Comment {
        comment_id: comment_id.to_string(),
        video_id: map.get("video_id").cloned()?,
        author_id: map.get("author_id").cloned().unwrap_or_default(),
        text: map.get("text").cloned().unwrap_or_default(),
        sentiment: map.get("sentiment").and_then(|s| s.parse().ok()),
        published_at: parse_ts(map.get("published_at")?)?,
        fetched_at: map
            .get("fetched_at")
            .and_then(|s| parse_ts(s))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    })
}

fn window_from_map(
    video_id: &str,
    window_start: &str,
    map: &HashMap<String, String>,
) -> Option<WindowMetrics> {
    if map.is_empty() {
        return None;
    }
    let f = |field: &str| -> f64 {
        map.get(field).and_then(|s| s.parse().ok()).unwrap_or(0.0)
    };
    let n = |field: &str| -> u64 {
        map.get(field).and_then(|s| s.parse().ok()).unwrap_or(0)
    };
    Some(WindowMetrics {
        video_id: video_id.to_string(),
        window_start: parse_ts(window_start)?,
        total_comments: n("total_comments"),
        unique_authors: n("unique_authors"),
        avg_length: f("avg_length"),
        avg_sentiment: f("avg_sentiment"),
        sentiment_variance: f("sentiment_variance"),
        avg_gap: f("avg_gap"),
        gap_variance: f("gap_variance"),
        coordination_score: map
            .get("coordination_score")
            .and_then(|s| s.parse().ok()),
    })
}
