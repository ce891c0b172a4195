use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tower::timeout::Timeout;
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn};

use crate::capture::Frame;
use crate::error::VisionError;
use crate::pipeline::detection::{
    Alert, AlertSeverity, AnalysisResult, AnalysisType, DetectionSource, StructureCategory,
    StructureDetection, TrajectoryValidation, TrajectoryWarning,
};
use crate::pipeline::segmentation::SegmentationEngine;
use crate::pipeline::vision::{
    backend::VisionRequest, extract, flatten_error, VisionBackend, VisionService,
};

/// Structures treated as critical for safety scoring and trajectory checks.
const CRITICAL_STRUCTURES: &[&str] = &["blood", "vessels"];

const LOCAL_CONFIDENCE: f32 = 0.85;
const EXTERNAL_CONFIDENCE: f32 = 0.5;

const CRITICAL_PENALTY_CAP: f64 = 20.0;
const PATHOLOGY_PENALTY: f64 = 5.0;

pub const DEFAULT_EXTERNAL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_millis(800);

pub fn is_critical_structure(name: &str) -> bool {
    CRITICAL_STRUCTURES.contains(&name.to_ascii_lowercase().as_str())
}

struct ThrottleState {
    last_call: Option<Instant>,
    cached: Option<Value>,
    external_calls: u64,
    external_failures: u64,
    served_from_cache: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub modality: String,
    pub external_enabled: bool,
    pub external_interval_ms: u64,
    pub frames_analyzed: u64,
    pub external_calls: u64,
    pub external_failures: u64,
    pub served_from_cache: u64,
    pub has_cached_payload: bool,
    /// Milliseconds since the cached payload was fetched, `None` before the
    /// first successful call.
    pub cache_age_ms: Option<u64>,
}

/// Per-frame analysis: always-local segmentation plus a throttled external
/// pass. External failures degrade to the last good payload instead of
/// failing the frame.
pub struct AnalysisOrchestrator {
    engine: SegmentationEngine,
    service: Option<Timeout<VisionService>>,
    external_interval: Duration,
    external_timeout: Duration,
    jpeg_quality: u8,
    // Held across the external call so at most one request is in flight.
    throttle: Mutex<ThrottleState>,
    frames_analyzed: AtomicU64,
}

impl AnalysisOrchestrator {
    pub fn new(engine: SegmentationEngine, backend: Option<Arc<dyn VisionBackend>>) -> Self {
        Self::with_timing(
            engine,
            backend,
            DEFAULT_EXTERNAL_INTERVAL,
            DEFAULT_EXTERNAL_TIMEOUT,
            85,
        )
    }

    pub fn with_timing(
        engine: SegmentationEngine,
        backend: Option<Arc<dyn VisionBackend>>,
        external_interval: Duration,
        external_timeout: Duration,
        jpeg_quality: u8,
    ) -> Self {
        let service = backend.map(|b| {
            info!(backend = %b.describe(), "External analysis enabled");
            VisionService::new(b).with_timeout(external_timeout)
        });
        Self {
            engine,
            service,
            external_interval,
            external_timeout,
            jpeg_quality,
            throttle: Mutex::new(ThrottleState {
                last_call: None,
                cached: None,
                external_calls: 0,
                external_failures: 0,
                served_from_cache: 0,
            }),
            frames_analyzed: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &SegmentationEngine {
        &self.engine
    }

    /// Runs the requested analysis depth on one frame. Never fails on
    /// external trouble; the result's `raw_analysis` is `None` when no
    /// payload, fresh or cached, was available.
    #[tracing::instrument(skip(self, frame), fields(frame_id = frame.id()))]
    pub async fn analyze_frame(
        &self,
        frame: &Frame,
        analysis_type: AnalysisType,
        force_external: bool,
    ) -> AnalysisResult {
        let started = Instant::now();
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);

        let mut structures = Vec::new();
        if analysis_type.wants_local() {
            structures = self.local_detections(frame);
        }

        // `force_external` bypasses the throttle, not the type gate.
        let payload = if self.service.is_some() && analysis_type.wants_external() {
            self.external_payload(frame, analysis_type, force_external)
                .await
        } else {
            None
        };

        let mut alerts = Vec::new();
        let mut instruments = Vec::new();
        let mut guidance = None;
        let mut explicit_voice = None;
        let mut technique_score = None;
        let mut external_safety = None;

        if let Some(payload) = &payload {
            external_safety = extract::safety_score(payload);
            technique_score = extract::technique_score(payload);
            instruments = extract::instruments(payload);
            alerts = extract::alerts(payload);
            guidance = extract::guidance(payload);
            explicit_voice = extract::voice_alert(payload);
            self.merge_external_structures(payload, &mut structures);
        }

        let safety_score =
            external_safety.unwrap_or_else(|| local_safety_score(&structures));
        let voice_alert = select_voice(&alerts, guidance.as_deref(), explicit_voice);

        AnalysisResult {
            frame_id: frame.id(),
            timestamp: frame.captured_at(),
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            analysis_type,
            safety_score,
            technique_score,
            structures,
            instruments,
            alerts,
            guidance,
            voice_alert,
            raw_analysis: payload,
        }
    }

    fn local_detections(&self, frame: &Frame) -> Vec<StructureDetection> {
        let masks = self.engine.segment_all(frame);
        let regions = self.engine.regions(&masks);

        let mut detections = Vec::new();
        for (structure, instances) in &regions {
            for instance in instances {
                detections.push(StructureDetection {
                    name: structure.clone(),
                    category: StructureCategory::classify(structure),
                    centroid: instance.centroid,
                    bounding_box: instance.bounding_box,
                    area: instance.area,
                    confidence: LOCAL_CONFIDENCE,
                    is_critical: is_critical_structure(structure),
                    safety_margin_mm: None,
                    source: DetectionSource::Segmentation,
                });
            }
        }
        detections
    }

    fn merge_external_structures(&self, payload: &Value, structures: &mut Vec<StructureDetection>) {
        for entry in extract::structure_entries(payload) {
            if structures.iter().any(|s| s.name == entry.name) {
                continue;
            }
            let bounding_box = entry.bounding_box.unwrap_or((0, 0, 0, 0));
            let centroid = (
                bounding_box.0 + bounding_box.2 / 2,
                bounding_box.1 + bounding_box.3 / 2,
            );
            structures.push(StructureDetection {
                category: StructureCategory::classify(&entry.name),
                centroid,
                bounding_box,
                area: 0,
                confidence: entry.confidence.unwrap_or(EXTERNAL_CONFIDENCE),
                is_critical: entry.safety_critical || is_critical_structure(&entry.name),
                safety_margin_mm: entry.safety_margin_mm,
                source: DetectionSource::VisionService,
                name: entry.name,
            });
        }
    }

    /// The throttled external pass. At most one request per interval; a
    /// failed or skipped request is served from the last good payload.
    async fn external_payload(
        &self,
        frame: &Frame,
        analysis_type: AnalysisType,
        force: bool,
    ) -> Option<Value> {
        let Some(service) = &self.service else {
            return None;
        };

        let mut throttle = self.throttle.lock().await;

        let due = match throttle.last_call {
            Some(last) => last.elapsed() >= self.external_interval,
            None => true,
        };
        if !due && !force {
            if throttle.cached.is_some() {
                throttle.served_from_cache += 1;
            }
            return throttle.cached.clone();
        }

        let jpeg = match frame.to_jpeg(self.jpeg_quality) {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = VisionError::FrameEncoding(e.to_string());
                warn!(frame_id = frame.id(), %error, "Using cached analysis");
                throttle.external_failures += 1;
                return throttle.cached.clone();
            }
        };

        let request = VisionRequest {
            frame_id: frame.id(),
            image_jpeg: jpeg,
            analysis_type,
            modality: self.engine.modality(),
        };

        throttle.external_calls += 1;

        let mut service = service.clone();
        let outcome = match service.ready().await {
            Ok(ready) => ready.call(request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(payload) => {
                debug!(frame_id = frame.id(), "External analysis succeeded");
                // Success-only, so a failed call leaves the throttle due.
                throttle.last_call = Some(Instant::now());
                throttle.cached = Some(payload.clone());
                Some(payload)
            }
            Err(e) => {
                let error: VisionError = flatten_error(e, self.external_timeout);
                warn!(frame_id = frame.id(), %error, "External analysis failed, using cached payload");
                throttle.external_failures += 1;
                if throttle.cached.is_some() {
                    throttle.served_from_cache += 1;
                }
                throttle.cached.clone()
            }
        }
    }

    /// Checks planned trajectory points against the centroids of critical
    /// detections. One warning per offending structure, at its closest point.
    pub fn validate_trajectory(
        &self,
        points: &[(u32, u32)],
        structures: &[StructureDetection],
        safety_margin_px: u32,
    ) -> TrajectoryValidation {
        let mut warnings = Vec::new();
        let mut min_distance: Option<u32> = None;

        for detection in structures.iter().filter(|s| s.is_critical) {
            let mut closest: Option<(f64, (u32, u32))> = None;
            for &point in points {
                let d = euclidean(point, detection.centroid);
                if closest.map_or(true, |(best, _)| d < best) {
                    closest = Some((d, point));
                }
            }
            let Some((distance, point)) = closest else {
                continue;
            };

            let rounded = distance.round() as u32;
            min_distance = Some(match min_distance {
                Some(d) => d.min(rounded),
                None => rounded,
            });
            // Compared unrounded; `rounded` is for reporting only.
            if distance < safety_margin_px as f64 {
                let severity = if distance < safety_margin_px as f64 / 2.0 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                };
                warnings.push(TrajectoryWarning {
                    structure: detection.name.clone(),
                    distance_px: rounded,
                    point,
                    severity,
                });
            }
        }

        let is_safe = warnings.is_empty();
        TrajectoryValidation {
            is_safe,
            min_distance_to_critical_px: min_distance,
            warnings,
            recommendation: if is_safe {
                "Clear trajectory".to_string()
            } else {
                "Adjust trajectory to avoid critical structures".to_string()
            },
        }
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let throttle = self.throttle.lock().await;
        OrchestratorStatus {
            modality: self.engine.modality().as_str().to_string(),
            external_enabled: self.service.is_some(),
            external_interval_ms: self.external_interval.as_millis() as u64,
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            external_calls: throttle.external_calls,
            external_failures: throttle.external_failures,
            served_from_cache: throttle.served_from_cache,
            has_cached_payload: throttle.cached.is_some(),
            cache_age_ms: throttle
                .last_call
                .map(|last| last.elapsed().as_millis() as u64),
        }
    }
}

/// Degraded safety score from local detections only. Each critical structure
/// costs up to 20 points scaled by its area, each pathology region a flat 5.
fn local_safety_score(structures: &[StructureDetection]) -> f64 {
    let mut score = 100.0;
    for detection in structures {
        if detection.is_critical {
            score -= (detection.area as f64 / 1000.0).min(CRITICAL_PENALTY_CAP);
        }
        if detection.category == StructureCategory::Pathology {
            score -= PATHOLOGY_PENALTY;
        }
    }
    score.clamp(0.0, 100.0)
}

/// Critical first, then warnings, then guidance. Lower-priority alerts never
/// preempt the surgeon's audio channel.
fn select_voice(
    alerts: &[Alert],
    guidance: Option<&str>,
    explicit: Option<String>,
) -> Option<String> {
    if explicit.is_some() {
        return explicit;
    }
    for severity in [AlertSeverity::Critical, AlertSeverity::Warning] {
        if let Some(alert) = alerts.iter().find(|a| a.severity == severity) {
            return Some(
                alert
                    .voice_message
                    .clone()
                    .unwrap_or_else(|| alert.message.clone()),
            );
        }
    }
    guidance.map(str::to_string)
}

fn euclidean(a: (u32, u32), b: (u32, u32)) -> f64 {
    let dx = a.0 as f64 - b.0 as f64;
    let dy = a.1 as f64 - b.1 as f64;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::Utc;
    use image::{DynamicImage, GrayImage, Luma};
    use serde_json::json;

    use super::*;
    use crate::pipeline::segmentation::Modality;

    fn gray_frame(id: u64, value: u8) -> Frame {
        Frame::new(
            id,
            DynamicImage::ImageLuma8(GrayImage::from_pixel(128, 128, Luma([value]))),
            Utc::now(),
        )
    }

    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        payload: Value,
    }

    #[async_trait]
    impl VisionBackend for CountingBackend {
        async fn analyze(&self, _req: VisionRequest) -> Result<Value, VisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }

        fn describe(&self) -> String {
            "counting test backend".to_string()
        }
    }

    struct FailAfterFirst {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VisionBackend for FailAfterFirst {
        async fn analyze(&self, _req: VisionRequest) -> Result<Value, VisionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(json!({"safety_score": 70, "guidance": "proceed slowly"}))
            } else {
                Err(VisionError::Request("connection refused".to_string()))
            }
        }

        fn describe(&self) -> String {
            "fail-after-first test backend".to_string()
        }
    }

    struct FailingBackend {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VisionBackend for FailingBackend {
        async fn analyze(&self, _req: VisionRequest) -> Result<Value, VisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(VisionError::Request("connection refused".to_string()))
        }

        fn describe(&self) -> String {
            "always-failing test backend".to_string()
        }
    }

    fn local_orchestrator(modality: Modality) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(SegmentationEngine::new(modality), None)
    }

    #[tokio::test]
    async fn local_only_analysis_reports_degraded_quality() {
        let orchestrator = local_orchestrator(Modality::Ultrasound);
        let result = orchestrator
            .analyze_frame(&gray_frame(1, 100), AnalysisType::Hybrid, false)
            .await;

        assert!(result.raw_analysis.is_none());
        assert_eq!(result.safety_score, 100.0);
        assert!(result.structures.iter().any(|s| s.name == "parenchyma"));
        assert!(result
            .structures
            .iter()
            .all(|s| s.source == DetectionSource::Segmentation));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_allows_at_most_one_call_per_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = AnalysisOrchestrator::new(
            SegmentationEngine::new(Modality::Ultrasound),
            Some(Arc::new(CountingBackend {
                calls: calls.clone(),
                payload: json!({"safety_score": 95}),
            })),
        );

        for id in 0..5 {
            let result = orchestrator
                .analyze_frame(&gray_frame(id, 100), AnalysisType::Hybrid, false)
                .await;
            assert_eq!(result.safety_score, 95.0);
            assert!(result.raw_analysis.is_some());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let status = orchestrator.status().await;
        assert_eq!(status.external_calls, 1);
        assert_eq!(status.served_from_cache, 4);
    }

    #[tokio::test]
    async fn force_external_bypasses_the_throttle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = AnalysisOrchestrator::new(
            SegmentationEngine::new(Modality::Ultrasound),
            Some(Arc::new(CountingBackend {
                calls: calls.clone(),
                payload: json!({"safety_score": 95}),
            })),
        );

        for id in 0..3 {
            orchestrator
                .analyze_frame(&gray_frame(id, 100), AnalysisType::Hybrid, true)
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn force_external_respects_the_analysis_type() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = AnalysisOrchestrator::new(
            SegmentationEngine::new(Modality::Ultrasound),
            Some(Arc::new(CountingBackend {
                calls: calls.clone(),
                payload: json!({"safety_score": 95}),
            })),
        );

        orchestrator
            .analyze_frame(&gray_frame(1, 100), AnalysisType::Segmentation, true)
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_call_leaves_the_throttle_due() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = AnalysisOrchestrator::new(
            SegmentationEngine::new(Modality::Ultrasound),
            Some(Arc::new(FailingBackend {
                calls: calls.clone(),
            })),
        );

        // Back to back, with no time passing in between.
        orchestrator
            .analyze_frame(&gray_frame(1, 100), AnalysisType::Hybrid, false)
            .await;
        orchestrator
            .analyze_frame(&gray_frame(2, 100), AnalysisType::Hybrid, false)
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let status = orchestrator.status().await;
        assert_eq!(status.external_calls, 2);
        assert_eq!(status.external_failures, 2);
        assert!(!status.has_cached_payload);
        assert_eq!(status.cache_age_ms, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_external_call_falls_back_to_cached_payload() {
        let orchestrator = AnalysisOrchestrator::new(
            SegmentationEngine::new(Modality::Ultrasound),
            Some(Arc::new(FailAfterFirst {
                calls: Arc::new(AtomicUsize::new(0)),
            })),
        );

        let first = orchestrator
            .analyze_frame(&gray_frame(1, 100), AnalysisType::Hybrid, false)
            .await;
        assert_eq!(first.safety_score, 70.0);

        tokio::time::advance(Duration::from_secs(1)).await;

        let second = orchestrator
            .analyze_frame(&gray_frame(2, 100), AnalysisType::Hybrid, false)
            .await;
        assert_eq!(second.safety_score, 70.0);
        assert_eq!(second.guidance.as_deref(), Some("proceed slowly"));
        assert!(second.raw_analysis.is_some());

        let status = orchestrator.status().await;
        assert_eq!(status.external_failures, 1);
    }

    #[tokio::test]
    async fn segmentation_only_analysis_skips_the_backend() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = AnalysisOrchestrator::new(
            SegmentationEngine::new(Modality::Ultrasound),
            Some(Arc::new(CountingBackend {
                calls: calls.clone(),
                payload: json!({"safety_score": 95}),
            })),
        );

        orchestrator
            .analyze_frame(&gray_frame(1, 100), AnalysisType::Segmentation, false)
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn external_structures_merge_without_duplicates() {
        let orchestrator = AnalysisOrchestrator::new(
            SegmentationEngine::new(Modality::Ultrasound),
            Some(Arc::new(CountingBackend {
                calls: Arc::new(AtomicUsize::new(0)),
                payload: json!({
                    "safety_score": 88,
                    "structures": ["parenchyma", "vessels"],
                }),
            })),
        );

        let result = orchestrator
            .analyze_frame(&gray_frame(1, 100), AnalysisType::Hybrid, false)
            .await;

        let vessels: Vec<_> = result
            .structures
            .iter()
            .filter(|s| s.name == "vessels")
            .collect();
        assert_eq!(vessels.len(), 1);
        assert_eq!(vessels[0].source, DetectionSource::VisionService);
        assert!(vessels[0].is_critical);

        let parenchyma: Vec<_> = result
            .structures
            .iter()
            .filter(|s| s.name == "parenchyma")
            .collect();
        assert_eq!(parenchyma.len(), 1);
        assert_eq!(parenchyma[0].source, DetectionSource::Segmentation);
    }

    #[tokio::test]
    async fn external_safety_critical_flag_marks_structures_critical() {
        let orchestrator = AnalysisOrchestrator::new(
            SegmentationEngine::new(Modality::Ultrasound),
            Some(Arc::new(CountingBackend {
                calls: Arc::new(AtomicUsize::new(0)),
                payload: json!({
                    "safety_score": 90,
                    "structures": [{
                        "name": "carotid",
                        "safety_critical": true,
                        "bounding_box": [10, 20, 30, 40],
                        "confidence": 0.9,
                        "safety_margin_mm": 3.0,
                    }],
                }),
            })),
        );

        let result = orchestrator
            .analyze_frame(&gray_frame(1, 100), AnalysisType::Hybrid, false)
            .await;

        let carotid = result
            .structures
            .iter()
            .find(|s| s.name == "carotid")
            .expect("carotid missing");
        assert!(carotid.is_critical);
        assert_eq!(carotid.centroid, (25, 40));
        assert_eq!(carotid.bounding_box, (10, 20, 30, 40));
        assert!((carotid.confidence - 0.9).abs() < 1e-6);
        assert_eq!(carotid.safety_margin_mm, Some(3.0));
    }

    #[test]
    fn local_safety_score_penalizes_critical_and_pathology() {
        let critical = StructureDetection {
            name: "blood".to_string(),
            category: StructureCategory::Vessel,
            centroid: (0, 0),
            bounding_box: (0, 0, 0, 0),
            area: 50_000,
            confidence: 0.85,
            is_critical: true,
            safety_margin_mm: None,
            source: DetectionSource::Segmentation,
        };
        let pathology = StructureDetection {
            name: "tumor".to_string(),
            category: StructureCategory::Pathology,
            area: 500,
            is_critical: false,
            ..critical.clone()
        };

        let critical_pathology = StructureDetection {
            name: "enhancement".to_string(),
            category: StructureCategory::Pathology,
            area: 10_000,
            is_critical: true,
            ..critical.clone()
        };

        // Critical penalty caps at 20 despite the huge area.
        assert_eq!(local_safety_score(&[critical.clone()]), 80.0);
        assert_eq!(local_safety_score(&[critical, pathology]), 75.0);
        // Both penalties apply when one detection qualifies for both.
        assert_eq!(local_safety_score(&[critical_pathology]), 85.0);
        assert_eq!(local_safety_score(&[]), 100.0);
    }

    #[test]
    fn local_safety_score_never_goes_negative() {
        let detection = StructureDetection {
            name: "blood".to_string(),
            category: StructureCategory::Vessel,
            centroid: (0, 0),
            bounding_box: (0, 0, 0, 0),
            area: 30_000,
            confidence: 0.85,
            is_critical: true,
            safety_margin_mm: None,
            source: DetectionSource::Segmentation,
        };
        let many = vec![detection; 10];
        assert_eq!(local_safety_score(&many), 0.0);
    }

    #[test]
    fn voice_selection_prefers_critical_alerts() {
        let alerts = vec![
            Alert::new(AlertSeverity::Info, "info", "routine"),
            Alert::new(AlertSeverity::Critical, "proximity", "vessel ahead")
                .with_voice("Stop. Vessel ahead."),
            Alert::new(AlertSeverity::Warning, "field", "glare"),
        ];
        assert_eq!(
            select_voice(&alerts, Some("advance slowly"), None).as_deref(),
            Some("Stop. Vessel ahead.")
        );
        assert_eq!(
            select_voice(&[], Some("advance slowly"), None).as_deref(),
            Some("advance slowly")
        );
        assert_eq!(
            select_voice(&alerts, None, Some("override".to_string())).as_deref(),
            Some("override")
        );
        assert_eq!(select_voice(&[], None, None), None);
    }

    fn blood_detection(centroid: (u32, u32)) -> StructureDetection {
        StructureDetection {
            name: "blood".to_string(),
            category: StructureCategory::Vessel,
            centroid,
            bounding_box: (0, 0, 10, 10),
            area: 400,
            confidence: 0.85,
            is_critical: true,
            safety_margin_mm: None,
            source: DetectionSource::Segmentation,
        }
    }

    #[test]
    fn trajectory_clear_of_critical_structures_is_safe() {
        let orchestrator = local_orchestrator(Modality::OrCamera);
        let points = [(0, 64), (64, 64), (127, 64)];
        let structures = [blood_detection((64, 120))];

        let validation = orchestrator.validate_trajectory(&points, &structures, 20);
        assert!(validation.is_safe);
        assert!(validation.warnings.is_empty());
        assert_eq!(validation.min_distance_to_critical_px, Some(56));
        assert_eq!(validation.recommendation, "Clear trajectory");
    }

    #[test]
    fn trajectory_inside_margin_raises_a_warning() {
        let orchestrator = local_orchestrator(Modality::OrCamera);
        let points = [(0, 64), (64, 64), (127, 64)];
        // 16 px below the closest point: inside the margin, outside half of it.
        let structures = [blood_detection((64, 80))];

        let validation = orchestrator.validate_trajectory(&points, &structures, 20);
        assert!(!validation.is_safe);
        assert_eq!(validation.warnings.len(), 1);
        assert_eq!(validation.warnings[0].severity, AlertSeverity::Warning);
        assert_eq!(validation.warnings[0].point, (64, 64));
        assert_eq!(
            validation.recommendation,
            "Adjust trajectory to avoid critical structures"
        );
    }

    #[test]
    fn trajectory_just_inside_the_margin_still_warns() {
        let orchestrator = local_orchestrator(Modality::OrCamera);
        // sqrt(6^2 + 19^2) = 19.92..., which rounds up to the margin.
        let structures = [blood_detection((6, 19))];

        let validation = orchestrator.validate_trajectory(&[(0, 0)], &structures, 20);
        assert!(!validation.is_safe);
        assert_eq!(validation.warnings.len(), 1);
        assert_eq!(validation.warnings[0].severity, AlertSeverity::Warning);
        assert_eq!(validation.warnings[0].distance_px, 20);
        assert_eq!(validation.min_distance_to_critical_px, Some(20));
    }

    #[test]
    fn trajectory_within_half_margin_escalates_to_critical() {
        let orchestrator = local_orchestrator(Modality::OrCamera);
        let points = [(0, 64), (64, 64)];
        let structures = [blood_detection((64, 70))];

        let validation = orchestrator.validate_trajectory(&points, &structures, 20);
        assert_eq!(validation.warnings[0].severity, AlertSeverity::Critical);
        assert_eq!(validation.min_distance_to_critical_px, Some(6));
    }

    #[test]
    fn trajectory_ignores_non_critical_structures() {
        let orchestrator = local_orchestrator(Modality::OrCamera);
        let mut tissue = blood_detection((64, 65));
        tissue.name = "tissue".to_string();
        tissue.category = StructureCategory::Parenchyma;
        tissue.is_critical = false;

        let validation = orchestrator.validate_trajectory(&[(64, 64)], &[tissue], 20);
        assert!(validation.is_safe);
        assert_eq!(validation.min_distance_to_critical_px, None);
    }
}
