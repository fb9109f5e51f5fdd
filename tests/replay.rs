//! Replay engine properties: idempotence, evaluate-before-update
//! ordering, and tolerance of silent periods.

use chrono::{DateTime, Duration, TimeZone, Utc};

use comment_sentinel::analysis::baseline::BaselineConfig;
use comment_sentinel::analysis::patterns::{AlertPublisher, AlertSink};
use comment_sentinel::analysis::RollingBaseline;
use comment_sentinel::replay::replay;
use comment_sentinel::store::memory::MemoryStore;
use comment_sentinel::store::{Comment, CommentStore};

const PERIOD: u64 = 600;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

/// Ten comments per listed window index, authors cycling through a
/// pool of five, evenly spaced inside the bucket.
async fn seed(store: &MemoryStore, window_indices: &[i64]) {
    let mut comments = Vec::new();
    for &w in window_indices {
        let start = base() + Duration::seconds(w * PERIOD as i64);
        for i in 0..10i64 {
            comments.push(Comment {
                comment_id: format!("cmt_{w:03}_{i:02}"),
                video_id: "vid".into(),
                author_id: format!("viewer_{}", i % 5),
                text: format!("window {w} comment {i}"),
                sentiment: Some(if i % 2 == 0 { 0.2 } else { -0.1 }),
                published_at: start + Duration::seconds(i * 55),
                fetched_at: start,
            });
        }
    }
    store.insert_comments(&comments).await.unwrap();
}

#[tokio::test]
async fn replay_twice_reproduces_rows_and_baseline() {
    let store = MemoryStore::new();
    seed(&store, &(0..14).collect::<Vec<_>>()).await;
    let publisher = AlertPublisher::detached(AlertSink::Log);

    let mut first = RollingBaseline::new(BaselineConfig::default());
    replay(&store, &mut first, &publisher, "vid", PERIOD).await.unwrap();
    let rows_first = store.windows_for_video("vid").await.unwrap();

    let mut second = RollingBaseline::new(BaselineConfig::default());
    replay(&store, &mut second, &publisher, "vid", PERIOD).await.unwrap();
    let rows_second = store.windows_for_video("vid").await.unwrap();

    assert_eq!(rows_first, rows_second);
    assert_eq!(first, second);
}

#[tokio::test]
async fn warmup_windows_persist_unscored() {
    let store = MemoryStore::new();
    seed(&store, &(0..14).collect::<Vec<_>>()).await;
    let publisher = AlertPublisher::detached(AlertSink::Log);

    let mut baseline = RollingBaseline::new(BaselineConfig::default());
    replay(&store, &mut baseline, &publisher, "vid", PERIOD).await.unwrap();

    let rows = store.windows_for_video("vid").await.unwrap();
    assert_eq!(rows.len(), 14);

    // Each window is evaluated against history that does not yet
    // contain it, so exactly the first `warmup_period` windows come
    // through unscored.
    assert!(rows[..10].iter().all(|w| w.coordination_score.is_none()));
    assert!(rows[10..].iter().all(|w| w.coordination_score.is_some()));

    // Windows land ascending and keyed to their bucket starts.
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(
            row.window_start,
            base() + Duration::seconds(i as i64 * PERIOD as i64)
        );
    }
}

#[tokio::test]
async fn silent_periods_do_not_pollute_the_baseline() {
    let store = MemoryStore::new();
    // Two quiet windows (6 and 7) in the middle of the history.
    seed(&store, &[0, 1, 2, 3, 4, 5, 8, 9, 10, 11, 12, 13]).await;
    let publisher = AlertPublisher::detached(AlertSink::Log);

    let mut baseline = RollingBaseline::new(BaselineConfig::default());
    replay(&store, &mut baseline, &publisher, "vid", PERIOD).await.unwrap();

    // Only the twelve active windows exist: no synthetic zeroes in
    // either the store or the baseline history.
    let rows = store.windows_for_video("vid").await.unwrap();
    assert_eq!(rows.len(), 12);
    assert!(rows.iter().all(|w| w.total_comments == 10));
    assert_eq!(baseline.len(), 12);
}

#[tokio::test]
async fn history_is_capped_at_max_windows() {
    let store = MemoryStore::new();
    seed(&store, &(0..25).collect::<Vec<_>>()).await;
    let publisher = AlertPublisher::detached(AlertSink::Log);

    let config = BaselineConfig::default();
    let mut baseline = RollingBaseline::new(config);
    replay(&store, &mut baseline, &publisher, "vid", PERIOD).await.unwrap();

    // 25 windows replayed through a capacity-20 history.
    assert_eq!(baseline.len(), config.max_windows);
    assert_eq!(store.windows_for_video("vid").await.unwrap().len(), 25);
}
