use std::path::Path;

use serde::Deserialize;

use crate::analysis::baseline::{BaselineConfig, Weights};
use crate::analysis::patterns::AlertSink;
use crate::error::SentinelError;

/// Environment variable that overrides the `api_key` config field.
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

// ─── Config file ─────────────────────────────────────────────────

/// Runtime configuration, loaded from a JSON file.
///
/// Every field except `videos` has a default, so a minimal config is
/// just `{"videos": ["<id>", ...]}` plus the API key in the
/// environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Video ids to monitor — one poll loop and one baseline each.
    pub videos: Vec<String>,

    /// Upstream API credential. `YOUTUBE_API_KEY` takes precedence.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Seconds between live polling ticks (also the window period P).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Sliding-history capacity of each per-video baseline.
    #[serde(default = "default_max_windows")]
    pub max_windows: usize,

    /// Windows observed before the baseline starts scoring.
    #[serde(default = "default_warmup_period")]
    pub warmup_period: usize,

    /// |z| at or below this is attenuated when composing the score.
    #[serde(default = "default_noise_floor")]
    pub noise_floor: f64,

    /// gap_var_z below this marks robotic timing.
    #[serde(default = "default_robotic_threshold")]
    pub robotic_threshold: f64,

    /// Multiplier applied to the gap signal past the robotic threshold.
    #[serde(default = "default_robotic_penalty")]
    pub robotic_penalty_multiplier: f64,

    /// Component weights of the coordination score.
    #[serde(default)]
    pub weights: Weights,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Bind address of the operator API.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Sentiment inference endpoint (HF text-classification shape).
    #[serde(default = "default_sentiment_url")]
    pub sentiment_url: String,

    /// Where rendered alert reports go: "stdout" or "log".
    #[serde(default)]
    pub alert_sink: AlertSink,
}

fn default_poll_interval() -> u64 {
    600
}
fn default_max_windows() -> usize {
    20
}
fn default_warmup_period() -> usize {
    10
}
fn default_noise_floor() -> f64 {
    1.0
}
fn default_robotic_threshold() -> f64 {
    -1.5
}
fn default_robotic_penalty() -> f64 {
    2.0
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".into()
}
fn default_listen_addr() -> String {
    "0.0.0.0:3000".into()
}
fn default_sentiment_url() -> String {
    "https://api-inference.huggingface.co/models/distilbert-base-uncased-finetuned-sst-2-english"
        .into()
}

// ─── Loading ─────────────────────────────────────────────────────

impl Config {
    /// Read and validate a config file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self, SentinelError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SentinelError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: Self = serde_json::from_str(&raw)
            .map_err(|e| SentinelError::Config(format!("{}: {e}", path.display())))?;

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.api_key = Some(key);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SentinelError> {
        if self.videos.is_empty() {
            return Err(SentinelError::Config("videos must not be empty".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(SentinelError::Config(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.max_windows < self.warmup_period {
            return Err(SentinelError::Config(
                "max_windows must be at least warmup_period".into(),
            ));
        }
        Ok(())
    }

    /// Baseline knobs bundled for `RollingBaseline::new`.
    pub fn baseline(&self) -> BaselineConfig {
        BaselineConfig {
            max_windows: self.max_windows,
            warmup_period: self.warmup_period,
            noise_floor: self.noise_floor,
            robotic_threshold: self.robotic_threshold,
            robotic_penalty_multiplier: self.robotic_penalty_multiplier,
            weights: self.weights,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
