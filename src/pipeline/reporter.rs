use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::pipeline::detection::{AlertSeverity, AnalysisResult};

pub const SAFETY_PHASE_PACE: Duration = Duration::from_millis(100);
pub const NAVIGATION_PHASE_PACE: Duration = Duration::from_millis(80);

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Which phase sequence a report streams through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportProfile {
    Safety,
    Navigation,
}

impl ReportProfile {
    pub fn phases(&self) -> &'static [&'static str] {
        match self {
            ReportProfile::Safety => &[
                "frame_start",
                "contamination_check",
                "sterile_field",
                "instrument_tracking",
                "personnel",
                "proximity",
                "summary",
            ],
            ReportProfile::Navigation => &[
                "frame_start",
                "structure_identification",
                "distances",
                "proximity",
                "phase_detection",
                "anomaly",
                "guidance",
                "summary",
            ],
        }
    }

    pub fn default_pace(&self) -> Duration {
        match self {
            ReportProfile::Safety => SAFETY_PHASE_PACE,
            ReportProfile::Navigation => NAVIGATION_PHASE_PACE,
        }
    }
}

/// One streamed phase of a report. The `summary` phase is always last and
/// is the only event with `is_final` set.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEvent {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub phase: &'static str,
    pub index: usize,
    pub total: usize,
    pub body: Value,
    pub is_final: bool,
}

/// Streams one analysis result as a sequence of paced phase events. Phases
/// arrive in profile order with a fixed inter-phase delay so downstream
/// consumers render progressively instead of all at once.
pub struct StreamingReporter {
    pace: Option<Duration>,
    cancel: CancellationToken,
}

impl StreamingReporter {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { pace: None, cancel }
    }

    /// Overrides the profile's default inter-phase delay.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Emits the phase sequence on a fresh stream. Cancellation is honored
    /// between phases; a cancelled stream simply ends, no summary.
    pub fn stream(
        &self,
        result: AnalysisResult,
        profile: ReportProfile,
    ) -> ReceiverStream<ReportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let pace = self.pace.unwrap_or_else(|| profile.default_pace());
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let phases = profile.phases();
            let total = phases.len();

            for (index, &phase) in phases.iter().enumerate() {
                if cancel.is_cancelled() {
                    debug!(frame_id = result.frame_id, phase, "Report stream cancelled");
                    return;
                }
                if index > 0 {
                    tokio::time::sleep(pace).await;
                }

                let event = ReportEvent {
                    frame_id: result.frame_id,
                    timestamp: result.timestamp,
                    phase,
                    index,
                    total,
                    body: phase_body(phase, &result),
                    is_final: index + 1 == total,
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

fn phase_body(phase: &str, result: &AnalysisResult) -> Value {
    match phase {
        "frame_start" => json!({
            "frame_id": result.frame_id,
            "analysis_type": result.analysis_type,
            "processing_time_ms": result.processing_time_ms,
        }),
        "contamination_check" => alerts_matching(result, "contamination"),
        "sterile_field" => alerts_matching(result, "sterile"),
        "personnel" => alerts_matching(result, "personnel"),
        "instrument_tracking" => json!({ "instruments": result.instruments }),
        "proximity" => {
            let warnings: Vec<_> = result
                .alerts
                .iter()
                .filter(|a| a.severity <= AlertSeverity::Warning)
                .collect();
            json!({ "warnings": warnings })
        }
        "structure_identification" => {
            let names: Vec<_> = result.structures.iter().map(|s| s.name.as_str()).collect();
            json!({ "structures": names })
        }
        "distances" => {
            let positions: Vec<_> = result
                .structures
                .iter()
                .map(|s| {
                    json!({
                        "name": s.name,
                        "centroid": s.centroid,
                        "area": s.area,
                        "is_critical": s.is_critical,
                    })
                })
                .collect();
            json!({ "positions": positions })
        }
        "phase_detection" => json!({ "technique_score": result.technique_score }),
        "anomaly" => {
            let critical: Vec<_> = result
                .alerts
                .iter()
                .filter(|a| a.severity == AlertSeverity::Critical)
                .collect();
            json!({ "anomalies": critical })
        }
        "guidance" => json!({
            "guidance": result.guidance,
            "voice_alert": result.voice_alert,
        }),
        "summary" => json!({
            "safety_score": result.safety_score,
            "technique_score": result.technique_score,
            "structure_count": result.structures.len(),
            "alert_count": result.alerts.len(),
            "guidance": result.guidance,
            "voice_alert": result.voice_alert,
        }),
        _ => Value::Null,
    }
}

fn alerts_matching(result: &AnalysisResult, needle: &str) -> Value {
    let matching: Vec<_> = result
        .alerts
        .iter()
        .filter(|a| {
            a.category.to_ascii_lowercase().contains(needle)
                || a.message.to_ascii_lowercase().contains(needle)
        })
        .collect();
    json!({
        "status": if matching.is_empty() { "clear" } else { "attention" },
        "alerts": matching,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::pipeline::detection::{Alert, AnalysisType};

    fn result(frame_id: u64) -> AnalysisResult {
        AnalysisResult {
            frame_id,
            timestamp: Utc::now(),
            processing_time_ms: 12.5,
            analysis_type: AnalysisType::Hybrid,
            safety_score: 92.0,
            technique_score: Some(81.0),
            structures: Vec::new(),
            instruments: Vec::new(),
            alerts: vec![
                Alert::new(AlertSeverity::Critical, "proximity", "vessel close"),
                Alert::new(AlertSeverity::Info, "sterile_field", "field intact"),
            ],
            guidance: Some("hold position".to_string()),
            voice_alert: None,
            raw_analysis: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn safety_stream_emits_phases_in_order() {
        let reporter = StreamingReporter::new(CancellationToken::new());
        let events: Vec<_> = reporter
            .stream(result(7), ReportProfile::Safety)
            .collect()
            .await;

        let phases: Vec<_> = events.iter().map(|e| e.phase).collect();
        assert_eq!(phases, ReportProfile::Safety.phases());
        assert!(events.last().unwrap().is_final);
        assert!(events[..events.len() - 1].iter().all(|e| !e.is_final));
        assert!(events.iter().all(|e| e.frame_id == 7));
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_stream_is_paced_between_phases() {
        let reporter = StreamingReporter::new(CancellationToken::new());
        let started = tokio::time::Instant::now();
        let events: Vec<_> = reporter
            .stream(result(1), ReportProfile::Navigation)
            .collect()
            .await;

        let phase_count = ReportProfile::Navigation.phases().len();
        assert_eq!(events.len(), phase_count);
        // One pace interval between each consecutive pair of phases.
        assert_eq!(
            started.elapsed(),
            NAVIGATION_PHASE_PACE * (phase_count as u32 - 1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pace_override_replaces_the_profile_default() {
        let reporter =
            StreamingReporter::new(CancellationToken::new()).with_pace(Duration::from_millis(10));
        let started = tokio::time::Instant::now();
        let events: Vec<_> = reporter
            .stream(result(2), ReportProfile::Safety)
            .collect()
            .await;

        assert_eq!(
            started.elapsed(),
            Duration::from_millis(10) * (events.len() as u32 - 1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_stream_ends_without_a_summary() {
        let cancel = CancellationToken::new();
        let reporter = StreamingReporter::new(cancel.clone());
        cancel.cancel();

        let events: Vec<_> = reporter
            .stream(result(1), ReportProfile::Safety)
            .collect()
            .await;
        assert!(events.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn summary_carries_scores_and_guidance() {
        let reporter = StreamingReporter::new(CancellationToken::new());
        let events: Vec<_> = reporter
            .stream(result(3), ReportProfile::Navigation)
            .collect()
            .await;

        let summary = events.last().unwrap();
        assert_eq!(summary.phase, "summary");
        assert_eq!(summary.body["safety_score"], 92.0);
        assert_eq!(summary.body["guidance"], "hold position");
    }

    #[tokio::test(start_paused = true)]
    async fn proximity_phase_surfaces_critical_alerts() {
        let reporter = StreamingReporter::new(CancellationToken::new());
        let events: Vec<_> = reporter
            .stream(result(4), ReportProfile::Safety)
            .collect()
            .await;

        let proximity = events.iter().find(|e| e.phase == "proximity").unwrap();
        let warnings = proximity.body["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0]["message"], "vessel close");
    }
}
