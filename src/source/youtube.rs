use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{CommentPage, CommentSource, SourceItem};
use crate::error::SentinelError;
use crate::store::parse_ts;

/// Comment-thread listing endpoint of the YouTube Data API v3.
pub const API_URL: &str = "https://www.googleapis.com/youtube/v3/commentThreads";

const PAGE_SIZE: u32 = 100;

// ─── Client ──────────────────────────────────────────────────────

/// Paginated comment source over the YouTube Data API. Pages arrive
/// newest-first, which is exactly the order the poller's early-stop
/// logic expects.
pub struct YouTubeSource {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl YouTubeSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: API_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl CommentSource for YouTubeSource {
    async fn fetch_page(
        &self,
        video_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, SentinelError> {
        let mut query: Vec<(&str, String)> = vec![
            ("part", "snippet".into()),
            ("videoId", video_id.into()),
            ("key", self.api_key.clone()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.into()));
        }

        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| SentinelError::Source(e.to_string()))?
            .error_for_status()
            .map_err(|e| SentinelError::Source(e.to_string()))?;

        let body: ThreadListResponse = response
            .json()
            .await
            .map_err(|e| SentinelError::Source(format!("decoding comment page: {e}")))?;

        let items = body
            .items
            .into_iter()
            .filter_map(|thread| {
                let id = thread.id.clone();
                parse_item(thread).or_else(|| {
                    debug!(video_id, comment_id = %id, "skipping malformed source item");
                    None
                })
            })
            .collect();

        Ok(CommentPage {
            items,
            next_page: body.next_page_token,
        })
    }
}

// ─── Wire format ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ThreadListResponse {
    #[serde(default)]
    items: Vec<Thread>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thread {
    id: String,
    snippet: Option<ThreadSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    top_level_comment: Option<TopLevelComment>,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    snippet: Option<CommentSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    author_channel_id: Option<ChannelId>,
    text_display: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelId {
    value: Option<String>,
}

/// Items missing an id, author, or timestamp are dropped rather than
/// failing the whole page.
fn parse_item(thread: Thread) -> Option<SourceItem> {
    let snippet = thread.snippet?.top_level_comment?.snippet?;
    let author_id = snippet.author_channel_id?.value?;
    let published_at = parse_ts(&snippet.published_at?)?;
    Some(SourceItem {
        comment_id: thread.id,
        author_id,
        text: snippet.text_display.unwrap_or_default(),
        published_at,
    })
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const THREAD_JSON: &str = r#"{
        "items": [
            {
                "id": "UgxKcmt001",
                "snippet": {
                    "topLevelComment": {
                        "snippet": {
                            "authorChannelId": {"value": "UCauthor1"},
                            "textDisplay": "nice one",
                            "publishedAt": "2026-02-26T18:10:31Z"
                        }
                    }
                }
            },
            {
                "id": "UgxKcmt002",
                "snippet": {
                    "topLevelComment": {
                        "snippet": {
                            "textDisplay": "orphaned, no author",
                            "publishedAt": "2026-02-26T18:09:00Z"
                        }
                    }
                }
            }
        ],
        "nextPageToken": "CAYQAA"
    }"#;

    #[test]
    fn parses_items_and_skips_malformed() {
        let body: ThreadListResponse = serde_json::from_str(THREAD_JSON).unwrap();
        assert_eq!(body.next_page_token.as_deref(), Some("CAYQAA"));

        let items: Vec<SourceItem> = body.items.into_iter().filter_map(parse_item).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].comment_id, "UgxKcmt001");
        assert_eq!(items[0].author_id, "UCauthor1");
        assert_eq!(items[0].text, "nice one");
        assert_eq!(
            crate::store::format_ts(items[0].published_at),
            "2026-02-26T18:10:31Z"
        );
    }

    #[test]
    fn empty_response_yields_no_items_or_token() {
        let body: ThreadListResponse = serde_json::from_str("{}").unwrap();
        assert!(body.items.is_empty());
        assert!(body.next_page_token.is_none());
    }
}
