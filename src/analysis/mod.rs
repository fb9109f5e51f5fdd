//! The anomaly-detection pipeline: window metric aggregation, the
//! per-video rolling baseline with robust z-scores, and the pattern
//! classifier that turns deviations into alerts.

pub mod aggregator;
pub mod baseline;
pub mod patterns;

pub use baseline::{RollingBaseline, ZScores};
pub use patterns::{classify, Alert, AlertReport};
