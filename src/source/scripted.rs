use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use uuid::Uuid;

use super::{CommentPage, CommentSource, SourceItem};
use crate::error::SentinelError;

// ─── Text pools ──────────────────────────────────────────────────

static CHATTER: &[&str] = &[
    "Great video, learned a lot!",
    "Can you cover this topic in more depth next time?",
    "I disagree with the part around the middle tbh",
    "Who else is watching this in 2026?",
    "The editing on this one is really clean",
    "Not your best work but still decent",
    "This deserves way more views",
    "First time seeing this channel, instantly subscribed",
    "The audio is a bit low on my end",
    "Came here from the shorts, no regrets",
];

static SCRIPTED: &[&str] = &[
    "Finally someone says the truth! Everyone needs to see this",
    "So glad this is getting exposed, share before it gets taken down",
    "100% accurate, the mainstream will never tell you this",
];

// ─── Scripted source ─────────────────────────────────────────────

/// A `CommentSource` backed by a pre-built item list, served
/// newest-first in fixed-size pages. Drives the test suite and
/// offline demo runs; the page counter lets tests assert the
/// early-stop behavior of the pagination driver.
pub struct ScriptedSource {
    items: Vec<SourceItem>,
    page_size: usize,
    pages_served: AtomicUsize,
}

impl ScriptedSource {
    /// `items` must already be ordered newest-first.
    pub fn new(items: Vec<SourceItem>, page_size: usize) -> Self {
        Self {
            items,
            page_size: page_size.max(1),
            pages_served: AtomicUsize::new(0),
        }
    }

    /// How many page requests this source has answered.
    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentSource for ScriptedSource {
    async fn fetch_page(
        &self,
        _video_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, SentinelError> {
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| SentinelError::Source(format!("bad page token {token:?}")))?,
            None => 0,
        };
        self.pages_served.fetch_add(1, Ordering::SeqCst);

        let end = (offset + self.page_size).min(self.items.len());
        let items = self.items[offset..end].to_vec();
        let next_page = (end < self.items.len()).then(|| end.to_string());
        Ok(CommentPage { items, next_page })
    }
}

// ─── Stream builder ──────────────────────────────────────────────

/// Builds deterministic synthetic comment streams: steady organic
/// chatter to warm a baseline, then bursts with the timing/authorship
/// signatures the classifier looks for.
pub struct StreamBuilder {
    rng: StdRng,
    cursor: DateTime<Utc>,
    seq: usize,
    items: Vec<SourceItem>,
}

impl StreamBuilder {
    pub fn new(seed: u64, start: DateTime<Utc>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            cursor: start,
            seq: 0,
            items: Vec::new(),
        }
    }

    fn push(&mut self, author: String, text: String, gap_secs: i64) {
        self.cursor += Duration::seconds(gap_secs.max(1));
        let id = format!(
            "cmt_{:06}_{}",
            self.seq,
            &Uuid::new_v4().simple().to_string()[..8]
        );
        self.seq += 1;
        self.items.push(SourceItem {
            comment_id: id,
            author_id: author,
            text,
            published_at: self.cursor,
        });
    }

    /// `windows` windows of organic-looking chatter: `per_window`
    /// comments from a pool of `authors`, spread across each
    /// `period_secs` window with jittered gaps.
    pub fn steady(
        mut self,
        windows: usize,
        per_window: usize,
        authors: usize,
        period_secs: u64,
    ) -> Self {
        let authors = authors.max(1);
        for _ in 0..windows {
            let window_end = self.cursor + Duration::seconds(period_secs as i64);
            let mean_gap = (period_secs as i64 / per_window.max(1) as i64).max(2);
            for _ in 0..per_window {
                let author = format!("viewer_{:03}", self.rng.gen_range(0..authors));
                let text = CHATTER[self.rng.gen_range(0..CHATTER.len())].to_string();
                let gap = self.rng.gen_range(1..=mean_gap * 2 - 1);
                self.push(author, text, gap);
            }
            // Park the cursor at the window boundary so each batch
            // lands in its own bucket.
            if self.cursor < window_end {
                self.cursor = window_end;
            }
        }
        self
    }

    /// A metronomic burst: `count` comments exactly `gap_secs` apart
    /// from a small author pool.
    pub fn robotic(mut self, count: usize, gap_secs: i64, authors: usize) -> Self {
        let authors = authors.max(1);
        for i in 0..count {
            let author = format!("scheduler_{:02}", i % authors);
            let text = SCRIPTED[i % SCRIPTED.len()].to_string();
            self.push(author, text, gap_secs);
        }
        self
    }

    /// A volume flood: `count` comments from `authors` accounts packed
    /// into roughly `within_secs`.
    pub fn flood(mut self, count: usize, authors: usize, within_secs: u64) -> Self {
        let authors = authors.max(1);
        let gap = (within_secs as i64 / count.max(1) as i64).max(1);
        for i in 0..count {
            let author = format!("burst_{:02}", i % authors);
            let text = SCRIPTED[self.rng.gen_range(0..SCRIPTED.len())].to_string();
            self.push(author, text, gap);
        }
        self
    }

    /// Finish the stream, newest first as a real source delivers it.
    pub fn build_newest_first(mut self) -> Vec<SourceItem> {
        self.items.reverse();
        self.items
    }
}

// ─── Tests ───────────────────────────────────────────────────────
