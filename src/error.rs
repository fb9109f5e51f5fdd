use thiserror::Error;

/// Unified error type for the monitoring pipeline.
///
/// Variants map onto the failure policies in the error-handling design:
/// source and sentiment errors are absorbed per-tick, store errors
/// terminate the owning video loop, config errors abort startup.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("comment source: {0}")]
    Source(String),

    #[error("sentiment inference: {0}")]
    Sentiment(String),

    #[error("store: {0}")]
    Store(String),

    #[error("config: {0}")]
    Config(String),
}

impl From<redis::RedisError> for SentinelError {
    fn from(e: redis::RedisError) -> Self {
        Self::Store(e.to_string())
    }
}
