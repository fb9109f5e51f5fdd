use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::baseline::ZScores;
use crate::error::SentinelError;
use crate::store::{format_ts, Comment, CommentStore, WindowMetrics};

// ─── Alert categories ────────────────────────────────────────────

/// Windows with fewer comments than this are never classified:
/// z-scores fluctuate too wildly on tiny samples.
pub const VOLUME_GUARD: u64 = 5;

const TOP_AUTHOR_LIMIT: usize = 5;
const TIMELINE_LIMIT: usize = 10;
const SAMPLE_TEXT_LIMIT: usize = 70;
const TIMELINE_TEXT_LIMIT: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Alert {
    RhythmicPulse,
    ScriptedNarrative,
    BotFlood,
    Brigade,
    InteractionDensity,
}

impl Alert {
    /// The operator-facing alert line.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::RhythmicPulse => {
                "🤖 Rhythmic Pulse: timing is significantly more consistent than usual"
            }
            Self::ScriptedNarrative => {
                "🚩 Scripted Narrative: uniform sentiment with unusually low diversity"
            }
            Self::BotFlood => {
                "👥 Bot Flood: massive volume spike from a suspiciously small group"
            }
            Self::Brigade => {
                "📣 Brigade / Organic Spike: volume and distinct authors surging together"
            }
            Self::InteractionDensity => {
                "🔁 Interaction Density: individual users are posting many times over"
            }
        }
    }
}

/// Map a z-vector plus raw metrics onto the alert set. The
/// predicates are independent; any subset may fire.
pub fn classify(z: &ZScores, record: &WindowMetrics) -> Vec<Alert> {
    if record.total_comments < VOLUME_GUARD {
        return Vec::new();
    }

    let mut alerts = Vec::new();
    if z.gap_var_z < -1.5 {
        alerts.push(Alert::RhythmicPulse);
    }
    if z.sentiment_z.abs() > 2.0 && z.sentiment_var_z < -1.0 {
        alerts.push(Alert::ScriptedNarrative);
    }
    if z.count_z > 2.0 && z.author_z < 1.0 {
        alerts.push(Alert::BotFlood);
    }
    if z.count_z > 3.0 && z.author_z > 3.0 {
        alerts.push(Alert::Brigade);
    }
    if z.concentration_z > 2.5 {
        alerts.push(Alert::InteractionDensity);
    }
    alerts
}

// ─── Forensic evidence ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AuthorEvidence {
    pub author_id: String,
    pub count: u64,
    /// Up to three truncated sample texts.
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub published_at: DateTime<Utc>,
    pub author_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum Evidence {
    /// Repeat authors in the window, descending by count.
    TopAuthors(Vec<AuthorEvidence>),
    /// The chronologically earliest comments of the window.
    Timeline(Vec<TimelineEntry>),
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}…")
    }
}

/// Authors with more than one comment in the window, descending by
/// count, with their first few texts as samples.
fn top_repeat_authors(comments: &[Comment], limit: usize) -> Vec<AuthorEvidence> {
    use std::collections::HashMap;

    let mut by_author: HashMap<&str, AuthorEvidence> = HashMap::new();
    for comment in comments {
        let entry = by_author
            .entry(comment.author_id.as_str())
            .or_insert_with(|| AuthorEvidence {
                author_id: comment.author_id.clone(),
                count: 0,
                samples: Vec::new(),
            });
        entry.count += 1;
        if entry.samples.len() < 3 {
            entry.samples.push(truncate_chars(&comment.text, SAMPLE_TEXT_LIMIT));
        }
    }

    let mut authors: Vec<AuthorEvidence> = by_author
        .into_values()
        .filter(|a| a.count > 1)
        .collect();
    authors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.author_id.cmp(&b.author_id)));
    authors.truncate(limit);
    authors
}

fn timeline(comments: &[Comment], limit: usize) -> Vec<TimelineEntry> {
    comments
        .iter()
        .take(limit)
        .map(|c| TimelineEntry {
            published_at: c.published_at,
            author_id: c.author_id.clone(),
            text: truncate_chars(&c.text, TIMELINE_TEXT_LIMIT),
        })
        .collect()
}

// ─── Alert report ────────────────────────────────────────────────

/// Everything the operator sees for one triggering window.
#[derive(Debug, Clone, Serialize)]
pub struct AlertReport {
    pub video_id: String,
    pub window_start: DateTime<Utc>,
    pub alerts: Vec<Alert>,
    pub coordination_score: f64,
    pub z: ZScores,
    pub evidence: Evidence,
}

impl AlertReport {
    /// Render the report as the operator-facing plain text block.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "\n[ALERT - {}] @ {}\n",
            self.video_id,
            format_ts(self.window_start)
        ));
        for alert in &self.alerts {
            out.push_str(&format!("  {}\n", alert.describe()));
        }

        match &self.evidence {
            Evidence::TopAuthors(authors) => {
                out.push_str("\n  --- Forensic Evidence: Top Repeat Commenters ---\n");
                for author in authors {
                    out.push_str(&format!(
                        "    {} (count: {})\n",
                        truncate_chars(&author.author_id, 8),
                        author.count
                    ));
                    for sample in &author.samples {
                        out.push_str(&format!("      - {sample}\n"));
                    }
                }
            }
            Evidence::Timeline(entries) => {
                out.push_str("\n  --- Forensic Evidence: Window Timeline ---\n");
                for entry in entries {
                    out.push_str(&format!(
                        "    [{}] {}: {}\n",
                        format_ts(entry.published_at),
                        truncate_chars(&entry.author_id, 8),
                        entry.text
                    ));
                }
            }
        }

        out.push_str("\n  --- Technical Metrics ---\n");
        out.push_str(&format!(
            "  Coordination score: {:.4}\n",
            self.coordination_score
        ));
        let salient: Vec<String> = self
            .z
            .most_salient(3)
            .into_iter()
            .map(|(name, value)| format!("{name}: {value:.1}"))
            .collect();
        out.push_str(&format!("  Z-scores -> {}\n", salient.join(" | ")));
        out
    }
}

/// Assemble a report, pulling forensic evidence from the store. The
/// evidence queries are read-only and bounded to the alerted window.
pub async fn build_report(
    store: &dyn CommentStore,
    record: &WindowMetrics,
    z: &ZScores,
    alerts: Vec<Alert>,
    coordination_score: f64,
    period_secs: u64,
) -> Result<AlertReport, SentinelError> {
    let window_end = record.window_start + Duration::seconds(period_secs as i64);
    let comments = store
        .comments_in_range(&record.video_id, record.window_start, window_end)
        .await?;

    let evidence = if alerts.contains(&Alert::InteractionDensity) {
        Evidence::TopAuthors(top_repeat_authors(&comments, TOP_AUTHOR_LIMIT))
    } else {
        Evidence::Timeline(timeline(&comments, TIMELINE_LIMIT))
    };

    Ok(AlertReport {
        video_id: record.video_id.clone(),
        window_start: record.window_start,
        alerts,
        coordination_score,
        z: *z,
        evidence,
    })
}

// ─── Publication ─────────────────────────────────────────────────

/// Where rendered reports are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSink {
    #[default]
    Stdout,
    Log,
}

/// Fans a finished report out to the configured text sink and to the
/// operator API's broadcast channel.
pub struct AlertPublisher {
    sink: AlertSink,
    tx: broadcast::Sender<AlertReport>,
}

impl AlertPublisher {
    pub fn new(sink: AlertSink, tx: broadcast::Sender<AlertReport>) -> Self {
        Self { sink, tx }
    }

    /// A publisher with its own channel, for tests and offline runs.
    pub fn detached(sink: AlertSink) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self::new(sink, tx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertReport> {
        self.tx.subscribe()
    }

    pub fn publish(&self, report: &AlertReport) {
        match self.sink {
            AlertSink::Stdout => println!("{}", report.render()),
            AlertSink::Log => tracing::warn!(
                video_id = %report.video_id,
                window_start = %format_ts(report.window_start),
                "{}",
                report.render()
            ),
        }
        // No subscribers is fine; the SSE endpoint may not be open.
        let _ = self.tx.send(report.clone());
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn zeroes() -> ZScores {
        ZScores {
            count_z: 0.0,
            author_z: 0.0,
            length_z: 0.0,
            sentiment_z: 0.0,
            concentration_z: 0.0,
            sentiment_var_z: 0.0,
            gap_z: 0.0,
            gap_var_z: 0.0,
        }
    }

    fn record(total: u64) -> WindowMetrics {
        WindowMetrics {
            video_id: "vid".into(),
            window_start: Utc.with_ymd_and_hms(2026, 2, 26, 18, 10, 0).unwrap(),
            total_comments: total,
            unique_authors: total.min(4),
            avg_length: 30.0,
            avg_sentiment: 0.0,
            sentiment_variance: 0.05,
            avg_gap: 20.0,
            gap_variance: 400.0,
            coordination_score: None,
        }
    }

    #[test]
    fn volume_guard_suppresses_everything() {
        // Wildly anomalous z-vector, but only four comments.
        let z = ZScores {
            count_z: 20.0,
            author_z: -20.0,
            length_z: 20.0,
            sentiment_z: 20.0,
            concentration_z: 20.0,
            sentiment_var_z: -20.0,
            gap_z: 20.0,
            gap_var_z: -20.0,
        };
        assert!(classify(&z, &record(4)).is_empty());
        assert!(!classify(&z, &record(5)).is_empty());
    }

    #[test]
    fn rhythmic_pulse_on_low_gap_variance() {
        let z = ZScores { gap_var_z: -1.6, ..zeroes() };
        assert_eq!(classify(&z, &record(10)), vec![Alert::RhythmicPulse]);
        // Exactly the threshold does not fire.
        let z = ZScores { gap_var_z: -1.5, ..zeroes() };
        assert!(classify(&z, &record(10)).is_empty());
    }

    #[test]
    fn scripted_narrative_needs_shift_and_low_diversity() {
        let z = ZScores { sentiment_z: -2.4, sentiment_var_z: -1.2, ..zeroes() };
        assert_eq!(classify(&z, &record(10)), vec![Alert::ScriptedNarrative]);
        // Shift alone is not enough.
        let z = ZScores { sentiment_z: 2.4, sentiment_var_z: 0.0, ..zeroes() };
        assert!(classify(&z, &record(10)).is_empty());
    }

    #[test]
    fn bot_flood_vs_brigade() {
        let flood = ZScores { count_z: 4.0, author_z: 0.4, ..zeroes() };
        assert_eq!(classify(&flood, &record(50)), vec![Alert::BotFlood]);

        let brigade = ZScores { count_z: 4.0, author_z: 4.0, ..zeroes() };
        assert_eq!(classify(&brigade, &record(50)), vec![Alert::Brigade]);
    }

    #[test]
    fn predicates_fire_independently() {
        let z = ZScores {
            count_z: 4.0,
            author_z: 0.2,
            concentration_z: 3.0,
            gap_var_z: -2.0,
            ..zeroes()
        };
        let alerts = classify(&z, &record(60));
        assert!(alerts.contains(&Alert::RhythmicPulse));
        assert!(alerts.contains(&Alert::BotFlood));
        assert!(alerts.contains(&Alert::InteractionDensity));
        assert_eq!(alerts.len(), 3);
    }

    fn comment(id: &str, author: &str, text: &str, offset: i64) -> Comment {
        let base = Utc.with_ymd_and_hms(2026, 2, 26, 18, 10, 0).unwrap();
        Comment {
            comment_id: id.into(),
            video_id: "vid".into(),
            author_id: author.into(),
            text: text.into(),
            sentiment: Some(0.0),
            published_at: base + Duration::seconds(offset),
            fetched_at: base,
        }
    }

    #[test]
    fn repeat_authors_ranked_by_count() {
        let mut comments = Vec::new();
        for i in 0..6 {
            comments.push(comment(&format!("a{i}"), "spammer", "same again", i));
        }
        for i in 0..3 {
            comments.push(comment(&format!("b{i}"), "echo", "me too", 10 + i));
        }
        comments.push(comment("c0", "bystander", "hi", 20));

        let ranked = top_repeat_authors(&comments, 5);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].author_id, "spammer");
        assert_eq!(ranked[0].count, 6);
        assert_eq!(ranked[0].samples.len(), 3);
        assert_eq!(ranked[1].author_id, "echo");
        // Single posters are not evidence of repetition.
        assert!(ranked.iter().all(|a| a.author_id != "bystander"));
    }

    #[test]
    fn truncation_is_char_safe() {
        let text = "é".repeat(100);
        let cut = truncate_chars(&text, 70);
        assert_eq!(cut.chars().count(), 71); // 70 chars + ellipsis
    }

    #[test]
    fn render_carries_header_alerts_and_footer() {
        let report = AlertReport {
            video_id: "vid123".into(),
            window_start: Utc.with_ymd_and_hms(2026, 2, 26, 18, 10, 0).unwrap(),
            alerts: vec![Alert::RhythmicPulse, Alert::BotFlood],
            coordination_score: 1.8342,
            z: ZScores { gap_var_z: -3.2, count_z: 4.1, ..zeroes() },
            evidence: Evidence::Timeline(vec![TimelineEntry {
                published_at: Utc.with_ymd_and_hms(2026, 2, 26, 18, 10, 31).unwrap(),
                author_id: "someauthor".into(),
                text: "hello".into(),
            }]),
        };

        let text = report.render();
        assert!(text.contains("[ALERT - vid123] @ 2026-02-26T18:10:00Z"));
        assert!(text.contains("Rhythmic Pulse"));
        assert!(text.contains("Bot Flood"));
        assert!(text.contains("Window Timeline"));
        assert!(text.contains("Coordination score: 1.8342"));
        // The two non-zero scores lead the salient list.
        assert!(text.contains("count: 4.1"));
        assert!(text.contains("gap_var: -3.2"));
    }
}
