use std::time::Instant;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

// ─── Configuration ───────────────────────────────────────────────

/// Histogram range: 1 ms → 10 min, 3 significant figures. Ticks are
/// dominated by network fetches, so millisecond resolution is plenty.
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 600_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe runtime metrics engine. Monitor loops call the
/// `record_*` methods, the operator API calls `snapshot()`.
pub struct OpsMetrics {
    inner: Mutex<Inner>,
    started: Instant,
}

/// Percentile breakdown of one latency histogram (milliseconds).
#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub count: u64,
}

impl LatencySummary {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self { min: 0, max: 0, mean: 0.0, p50: 0, p95: 0, p99: 0, count: 0 };
        }
        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_percentile(50.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            count: hist.len(),
        }
    }
}

/// Complete snapshot served by `GET /api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct OpsSnapshot {
    pub uptime_secs: f64,
    pub tick_latency_ms: LatencySummary,
    pub fetch_latency_ms: LatencySummary,
    pub ticks: u64,
    pub comments_ingested: u64,
    pub windows_scored: u64,
    pub alerts_emitted: u64,
    pub fetch_errors: u64,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    tick_hist: Histogram<u64>,
    fetch_hist: Histogram<u64>,
    ticks: u64,
    comments_ingested: u64,
    windows_scored: u64,
    alerts_emitted: u64,
    fetch_errors: u64,
}

impl Inner {
    fn new() -> Self {
        let hist = || {
            Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation")
        };
        Self {
            tick_hist: hist(),
            fetch_hist: hist(),
            ticks: 0,
            comments_ingested: 0,
            windows_scored: 0,
            alerts_emitted: 0,
            fetch_errors: 0,
        }
    }
}

// ─── OpsMetrics impl ─────────────────────────────────────────────

impl Default for OpsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OpsMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            started: Instant::now(),
        }
    }

    pub fn record_tick(&self, elapsed_ms: u64) {
        let mut inner = self.inner.lock();
        inner.ticks += 1;
        let _ = inner.tick_hist.record(elapsed_ms.clamp(HIST_LOW, HIST_HIGH));
    }

    pub fn record_fetch(&self, elapsed_ms: u64) {
        let _ = self
            .inner
            .lock()
            .fetch_hist
            .record(elapsed_ms.clamp(HIST_LOW, HIST_HIGH));
    }

    pub fn add_ingested(&self, count: u64) {
        self.inner.lock().comments_ingested += count;
    }

    pub fn inc_windows_scored(&self) {
        self.inner.lock().windows_scored += 1;
    }

    pub fn add_alerts(&self, count: u64) {
        self.inner.lock().alerts_emitted += count;
    }

    pub fn inc_fetch_errors(&self) {
        self.inner.lock().fetch_errors += 1;
    }

    pub fn snapshot(&self) -> OpsSnapshot {
        let inner = self.inner.lock();
        OpsSnapshot {
            uptime_secs: self.started.elapsed().as_secs_f64(),
            tick_latency_ms: LatencySummary::from_histogram(&inner.tick_hist),
            fetch_latency_ms: LatencySummary::from_histogram(&inner.fetch_hist),
            ticks: inner.ticks,
            comments_ingested: inner.comments_ingested,
            windows_scored: inner.windows_scored,
            alerts_emitted: inner.alerts_emitted,
            fetch_errors: inner.fetch_errors,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_is_zeroed() {
        let snap = OpsMetrics::new().snapshot();
        assert_eq!(snap.ticks, 0);
        assert_eq!(snap.tick_latency_ms.count, 0);
        assert_eq!(snap.tick_latency_ms.p99, 0);
    }

    #[test]
    fn counters_accumulate() {
        let ops = OpsMetrics::new();
        ops.record_tick(120);
        ops.record_tick(80);
        ops.add_ingested(42);
        ops.inc_windows_scored();
        ops.add_alerts(2);
        ops.inc_fetch_errors();

        let snap = ops.snapshot();
        assert_eq!(snap.ticks, 2);
        assert_eq!(snap.comments_ingested, 42);
        assert_eq!(snap.windows_scored, 1);
        assert_eq!(snap.alerts_emitted, 2);
        assert_eq!(snap.fetch_errors, 1);
        assert_eq!(snap.tick_latency_ms.count, 2);
        assert!(snap.tick_latency_ms.max >= 120);
    }
}
