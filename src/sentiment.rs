use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SentinelError;

// ─── Classifier contract ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SentimentLabel {
    #[serde(rename = "POSITIVE")]
    Positive,
    #[serde(rename = "NEGATIVE")]
    Negative,
}

/// Raw classifier output: the winning label and its confidence in
/// `[0.5, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SentimentOutcome {
    pub label: SentimentLabel,
    pub score: f64,
}

/// Map a classifier outcome onto the continuous `[-1, 1]` scale,
/// where 0 means ambiguous.
pub fn scalar(outcome: &SentimentOutcome) -> f64 {
    let val = match outcome.label {
        SentimentLabel::Positive => outcome.score,
        SentimentLabel::Negative => 1.0 - outcome.score,
    };
    (val - 0.5) * 2.0
}

/// Black-box sentiment classifier, scored in batches.
#[async_trait]
pub trait SentimentModel: Send + Sync {
    /// One outcome per input text, same order.
    async fn score_batch(&self, texts: &[String])
        -> Result<Vec<SentimentOutcome>, SentinelError>;
}

// ─── HTTP inference client ───────────────────────────────────────

/// Client for an HTTP inference endpoint speaking the Hugging Face
/// text-classification shape: request `{"inputs": [...]}`, response
/// one list of `{label, score}` candidates per input.
pub struct HttpSentiment {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpSentiment {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            token: None,
        }
    }

    /// Bearer token for hosted inference endpoints.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl SentimentModel for HttpSentiment {
    async fn score_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<SentimentOutcome>, SentinelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "inputs": texts }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SentinelError::Sentiment(e.to_string()))?
            .error_for_status()
            .map_err(|e| SentinelError::Sentiment(e.to_string()))?;

        // Some deployments return the candidate list per input,
        // others only the winning label.
        let candidates: Vec<Vec<SentimentOutcome>> = response
            .json()
            .await
            .map_err(|e| SentinelError::Sentiment(format!("decoding response: {e}")))?;

        if candidates.len() != texts.len() {
            return Err(SentinelError::Sentiment(format!(
                "expected {} outcomes, got {}",
                texts.len(),
                candidates.len()
            )));
        }

        candidates
            .into_iter()
            .map(|options| {
                options
                    .into_iter()
                    .max_by(|a, b| a.score.total_cmp(&b.score))
                    .ok_or_else(|| {
                        SentinelError::Sentiment("empty candidate list for input".into())
                    })
            })
            .collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────
