use tracing::{debug, info};

use crate::analysis::aggregator;
use crate::analysis::patterns::{self, AlertPublisher};
use crate::analysis::RollingBaseline;
use crate::error::SentinelError;
use crate::store::CommentStore;

/// Warm a video's baseline from its persisted comment history and
/// backfill window scores.
///
/// Windows are processed in ascending order; each is evaluated
/// against history that does not yet contain it, then appended.
/// Zero-volume windows the aggregator emits are skipped outright so
/// synthetic zeroes never pollute the baseline. Re-running is safe:
/// every upsert reproduces the same row.
pub async fn replay(
    store: &dyn CommentStore,
    baseline: &mut RollingBaseline,
    publisher: &AlertPublisher,
    video_id: &str,
    period_secs: u64,
) -> Result<(), SentinelError> {
    let windows = aggregator::aggregate_all(store, video_id, period_secs).await?;
    if windows.is_empty() {
        info!(video_id, "no historical windows to replay");
        return Ok(());
    }

    let mut scored = 0usize;
    for mut record in windows {
        if record.total_comments == 0 {
            continue;
        }

        if let Some(z) = baseline.evaluate(&record) {
            let score = baseline.coordination_score(&z);
            record.coordination_score = Some(score);
            scored += 1;

            let alerts = patterns::classify(&z, &record);
            if !alerts.is_empty() {
                let report =
                    patterns::build_report(store, &record, &z, alerts, score, period_secs)
                        .await?;
                publisher.publish(&report);
            }
        } else {
            debug!(video_id, "window within warmup, not scored");
        }

        store.upsert_window(&record).await?;
        baseline.update(&record);
    }

    info!(
        video_id,
        windows_in_history = baseline.len(),
        scored, "historical replay complete"
    );
    Ok(())
}
