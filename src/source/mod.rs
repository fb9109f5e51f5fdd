pub mod scripted;
pub mod youtube;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SentinelError;

// ─── Source contract ─────────────────────────────────────────────

/// One raw item from the upstream platform, before sentiment scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub comment_id: String,
    pub author_id: String,
    pub text: String,
    pub published_at: DateTime<Utc>,
}

/// A page of items, newest first, plus the marker for the next page.
#[derive(Debug, Clone)]
pub struct CommentPage {
    pub items: Vec<SourceItem>,
    pub next_page: Option<String>,
}

/// A paginated comment endpoint delivering items newest-first.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn fetch_page(
        &self,
        video_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, SentinelError>;
}

// ─── Pagination driver ───────────────────────────────────────────

/// Page through `source` newest-first, stopping early once `stop_at`
/// is reached. Everything *before* the stop id is returned, newest
/// first; with `stop_at = None` the full history comes back.
pub async fn fetch_until(
    source: &dyn CommentSource,
    video_id: &str,
    stop_at: Option<&str>,
) -> Result<Vec<SourceItem>, SentinelError> {
    let mut collected = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = source.fetch_page(video_id, page_token.as_deref()).await?;

        for item in page.items {
            if stop_at.is_some_and(|id| id == item.comment_id) {
                return Ok(collected);
            }
            collected.push(item);
        }

        match page.next_page {
            Some(token) => page_token = Some(token),
            None => return Ok(collected),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
