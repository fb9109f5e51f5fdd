use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::store::WindowMetrics;

// ─── Per-series noise floors ─────────────────────────────────────
//
// Minimum scale for each series' MAD estimate. Near-constant history
// would otherwise turn ordinary micro-fluctuations into huge
// z-scores.

const COUNT_FLOOR: f64 = 2.0;
const AUTHOR_FLOOR: f64 = 2.0;
const LENGTH_FLOOR: f64 = 10.0;
const SENTIMENT_FLOOR: f64 = 0.1;
const CONCENTRATION_FLOOR: f64 = 0.15;
const SENTIMENT_VAR_FLOOR: f64 = 0.05;
const GAP_FLOOR: f64 = 5.0;
const GAP_VAR_FLOOR: f64 = 10.0;

/// Consistency constant: MAD × 1.4826 estimates σ for normal data.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Robust z-scores are clamped here to keep the composite score from
/// blowing out.
const Z_CLAMP: f64 = 20.0;

// ─── Configuration ───────────────────────────────────────────────

/// Component weights of the coordination score.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Weights {
    #[serde(default = "default_w_concentration")]
    pub concentration: f64,
    #[serde(default = "default_w_gap_variance")]
    pub gap_variance: f64,
    #[serde(default = "default_w_sentiment_var")]
    pub sentiment_var: f64,
    #[serde(default = "default_w_count")]
    pub count: f64,
}

fn default_w_concentration() -> f64 {
    0.4
}
fn default_w_gap_variance() -> f64 {
    0.3
}
fn default_w_sentiment_var() -> f64 {
    0.2
}
fn default_w_count() -> f64 {
    0.1
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            concentration: default_w_concentration(),
            gap_variance: default_w_gap_variance(),
            sentiment_var: default_w_sentiment_var(),
            count: default_w_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineConfig {
    /// Sliding-history capacity.
    pub max_windows: usize,
    /// Windows required before `evaluate` starts producing z-vectors.
    pub warmup_period: usize,
    /// Dampening threshold: |z| at or below this is attenuated ×0.1.
    pub noise_floor: f64,
    /// gap_var_z below this marks robotic timing.
    pub robotic_threshold: f64,
    /// Boost applied to the gap signal past the robotic threshold.
    pub robotic_penalty_multiplier: f64,
    pub weights: Weights,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            max_windows: 20,
            warmup_period: 10,
            noise_floor: 1.0,
            robotic_threshold: -1.5,
            robotic_penalty_multiplier: 2.0,
            weights: Weights::default(),
        }
    }
}

// ─── Z-vector ────────────────────────────────────────────────────

/// Robust deviations of one window from the video's recent history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZScores {
    pub count_z: f64,
    pub author_z: f64,
    pub length_z: f64,
    pub sentiment_z: f64,
    pub concentration_z: f64,
    pub sentiment_var_z: f64,
    pub gap_z: f64,
    pub gap_var_z: f64,
}

impl ZScores {
    fn named(&self) -> [(&'static str, f64); 8] {
        [
            ("count", self.count_z),
            ("author", self.author_z),
            ("length", self.length_z),
            ("sentiment", self.sentiment_z),
            ("concentration", self.concentration_z),
            ("sentiment_var", self.sentiment_var_z),
            ("gap", self.gap_z),
            ("gap_var", self.gap_var_z),
        ]
    }

    /// The `n` largest-magnitude scores, descending, as
    /// `(series, value)` pairs.
    pub fn most_salient(&self, n: usize) -> Vec<(&'static str, f64)> {
        let mut entries = self.named().to_vec();
        entries.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        entries.truncate(n);
        entries
    }
}

// ─── Rolling baseline ────────────────────────────────────────────

/// Per-video sliding history over eight parallel metric series.
/// Owned exclusively by that video's monitor task; reconstructed by
/// replay after a restart, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingBaseline {
    config: BaselineConfig,
    counts: VecDeque<f64>,
    authors: VecDeque<f64>,
    lengths: VecDeque<f64>,
    sentiments: VecDeque<f64>,
    concentration: VecDeque<f64>,
    sentiment_var: VecDeque<f64>,
    avg_gaps: VecDeque<f64>,
    gap_vars: VecDeque<f64>,
}

impl RollingBaseline {
    pub fn new(config: BaselineConfig) -> Self {
        let cap = config.max_windows.max(1);
        Self {
            config,
            counts: VecDeque::with_capacity(cap),
            authors: VecDeque::with_capacity(cap),
            lengths: VecDeque::with_capacity(cap),
            sentiments: VecDeque::with_capacity(cap),
            concentration: VecDeque::with_capacity(cap),
            sentiment_var: VecDeque::with_capacity(cap),
            avg_gaps: VecDeque::with_capacity(cap),
            gap_vars: VecDeque::with_capacity(cap),
        }
    }

    /// Windows currently in the history.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Append a window's derived values, evicting the oldest entry
    /// once the capacity is reached.
    pub fn update(&mut self, record: &WindowMetrics) {
        let cap = self.config.max_windows.max(1);
        let authors = record.unique_authors.max(1) as f64;
        push_bounded(&mut self.counts, record.total_comments as f64, cap);
        push_bounded(&mut self.authors, authors, cap);
        push_bounded(&mut self.lengths, record.avg_length, cap);
        push_bounded(&mut self.sentiments, record.avg_sentiment, cap);
        push_bounded(
            &mut self.concentration,
            record.total_comments as f64 / authors,
            cap,
        );
        push_bounded(&mut self.sentiment_var, record.sentiment_variance, cap);
        push_bounded(&mut self.avg_gaps, record.avg_gap, cap);
        push_bounded(&mut self.gap_vars, record.gap_variance, cap);
    }

    /// Score a window against the *current* history. Callers must
    /// invoke this before `update` for the same record, so a window
    /// is never compared against itself.
    pub fn evaluate(&self, record: &WindowMetrics) -> Option<ZScores> {
        if self.len() < self.config.warmup_period {
            return None;
        }

        let total = record.total_comments as f64;
        let authors = record.unique_authors.max(1) as f64;

        Some(ZScores {
            count_z: robust_z(total, &self.counts, COUNT_FLOOR),
            author_z: robust_z(authors, &self.authors, AUTHOR_FLOOR),
            length_z: robust_z(record.avg_length, &self.lengths, LENGTH_FLOOR),
            sentiment_z: robust_z(record.avg_sentiment, &self.sentiments, SENTIMENT_FLOOR),
            concentration_z: robust_z(total / authors, &self.concentration, CONCENTRATION_FLOOR),
            sentiment_var_z: robust_z(
                record.sentiment_variance,
                &self.sentiment_var,
                SENTIMENT_VAR_FLOOR,
            ),
            gap_z: robust_z(record.avg_gap, &self.avg_gaps, GAP_FLOOR),
            gap_var_z: robust_z(record.gap_variance, &self.gap_vars, GAP_VAR_FLOOR),
        })
    }

    /// Weighted composite of the dampened absolute z-scores, with the
    /// robotic bias on the gap-variance term: timing that is too
    /// *consistent* outweighs generic dispersion.
    pub fn coordination_score(&self, z: &ZScores) -> f64 {
        let w = &self.config.weights;

        let mut gap_signal = self.dampen(z.gap_var_z);
        if z.gap_var_z < self.config.robotic_threshold {
            gap_signal *= self.config.robotic_penalty_multiplier;
        }

        let score = self.dampen(z.concentration_z) * w.concentration
            + gap_signal * w.gap_variance
            + self.dampen(z.sentiment_var_z) * w.sentiment_var
            + self.dampen(z.count_z) * w.count;

        (score * 10_000.0).round() / 10_000.0
    }

    /// Sub-threshold deviations contribute attenuated signal.
    fn dampen(&self, z: f64) -> f64 {
        let magnitude = z.abs();
        if magnitude > self.config.noise_floor {
            magnitude
        } else {
            magnitude * 0.1
        }
    }
}

fn push_bounded(series: &mut VecDeque<f64>, value: f64, cap: usize) {
    if series.len() == cap {
        series.pop_front();
    }
    series.push_back(value);
}

// ─── Robust statistics ───────────────────────────────────────────

fn median_of(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Deviation from the series median scaled by the MAD-based σ
/// estimate, floored per series and clamped to ±20. Series shorter
/// than 3 carry no usable scale and score 0.
fn robust_z(value: f64, series: &VecDeque<f64>, noise_floor: f64) -> f64 {
    if series.len() < 3 {
        return 0.0;
    }

    let values: Vec<f64> = series.iter().copied().collect();
    let median = median_of(values.clone());
    let mad = median_of(values.into_iter().map(|x| (x - median).abs()).collect());

    let mut sigma = mad * MAD_TO_SIGMA;
    if sigma < noise_floor {
        sigma = noise_floor;
    }
    if sigma == 0.0 {
        return 0.0;
    }

    ((value - median) / sigma).clamp(-Z_CLAMP, Z_CLAMP)
}

// ─── Tests ───────────────────────────────────────────────────────
