use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::{
    CaptureWorker, FileLoopSource, FrameBuffer, FrameProducer, SyntheticSource,
};
use crate::config::Configuration;
use crate::error::AppError;
use crate::pipeline::detection::AnalysisType;
use crate::pipeline::orchestrator::AnalysisOrchestrator;
use crate::pipeline::reporter::{ReportProfile, StreamingReporter};
use crate::pipeline::segmentation::SegmentationEngine;
use crate::pipeline::vision::{HttpVisionBackend, VisionBackend};
use crate::status::PipelineStatus;

const POP_TIMEOUT: Duration = Duration::from_millis(100);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the capture worker and the analysis task and ties their lifetimes
/// to one cancellation token.
pub struct Coordinator {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    started_instant: Instant,
    source_description: String,
    resolution: (u32, u32),
    target_fps: u32,
    worker: CaptureWorker,
    buffer: Arc<FrameBuffer>,
    orchestrator: Arc<AnalysisOrchestrator>,
    analysis_task: tokio::task::JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Coordinator {
    fn new(
        configuration: Configuration,
        producer: Box<dyn FrameProducer>,
        backend: Option<Arc<dyn VisionBackend>>,
        analysis_type: AnalysisType,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let source_description = producer.describe();
        let buffer = Arc::new(FrameBuffer::new(configuration.frame_buffer_capacity));

        let engine = SegmentationEngine::new(configuration.modality)
            .with_min_area(configuration.min_region_area);
        let orchestrator = Arc::new(AnalysisOrchestrator::with_timing(
            engine,
            backend,
            configuration.external_interval(),
            configuration.external_timeout(),
            configuration.jpeg_quality,
        ));

        let worker = CaptureWorker::spawn(
            producer,
            Arc::clone(&buffer),
            configuration.target_fps,
            cancel_token.clone(),
        );

        let analysis_task = Self::start_analysis_task(
            Arc::clone(&buffer),
            Arc::clone(&orchestrator),
            analysis_type,
            configuration.yield_interval(),
            cancel_token.clone(),
        );

        info!(
            source = %source_description,
            modality = configuration.modality.as_str(),
            "Pipeline started"
        );

        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            started_instant: Instant::now(),
            source_description,
            resolution: configuration.resolution,
            target_fps: configuration.target_fps,
            worker,
            buffer,
            orchestrator,
            analysis_task,
            cancel_token,
        }
    }

    fn start_analysis_task(
        buffer: Arc<FrameBuffer>,
        orchestrator: Arc<AnalysisOrchestrator>,
        analysis_type: AnalysisType,
        report_pace: Duration,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let profile = match analysis_type {
            AnalysisType::Navigation => ReportProfile::Navigation,
            _ => ReportProfile::Safety,
        };
        let reporter = StreamingReporter::new(cancel_token.clone()).with_pace(report_pace);

        tokio::spawn(async move {
            while !cancel_token.is_cancelled() {
                let pop_buffer = Arc::clone(&buffer);
                let frame = match tokio::task::spawn_blocking(move || pop_buffer.pop(POP_TIMEOUT))
                    .await
                {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Frame wait task failed: {e}");
                        break;
                    }
                };

                let result = orchestrator.analyze_frame(&frame, analysis_type, false).await;
                if let Some(voice) = &result.voice_alert {
                    info!(frame_id = result.frame_id, "Voice alert: {voice}");
                }

                let mut events = reporter.stream(result, profile);
                while let Some(event) = events.next().await {
                    if event.is_final {
                        info!(
                            frame_id = event.frame_id,
                            safety_score = %event.body["safety_score"],
                            "Frame analyzed"
                        );
                    } else {
                        debug!(frame_id = event.frame_id, phase = event.phase, "Report phase");
                    }
                }
            }
        })
    }

    pub fn pause(&self) {
        self.worker.pause();
    }

    pub fn resume(&self) {
        self.worker.resume();
    }

    pub fn orchestrator(&self) -> &AnalysisOrchestrator {
        &self.orchestrator
    }

    pub async fn status(&self) -> PipelineStatus {
        PipelineStatus {
            session_id: self.session_id,
            started_at: self.started_at,
            uptime_secs: self.started_instant.elapsed().as_secs(),
            source: self.source_description.clone(),
            resolution: self.resolution,
            target_fps: self.target_fps,
            capture: self.worker.status(),
            buffer: self.buffer.status(),
            analysis: self.orchestrator.status().await,
        }
    }

    /// Stops capture and analysis, draining the buffer. Bounded; a stuck
    /// producer surfaces as a stop timeout error.
    pub async fn shutdown(self) -> Result<(), AppError> {
        self.cancel_token.cancel();
        self.worker.stop(SHUTDOWN_TIMEOUT).await?;
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.analysis_task)
            .await
            .is_err()
        {
            return Err(AppError::Pipeline(
                "Analysis task did not stop in time".to_string(),
            ));
        }
        info!("Pipeline stopped");
        Ok(())
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    producer: Option<Box<dyn FrameProducer>>,
    backend: Option<Arc<dyn VisionBackend>>,
    analysis_type: AnalysisType,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            producer: None,
            backend: None,
            analysis_type: AnalysisType::Hybrid,
        }
    }

    // Overrides the configured imaging modality.
    pub fn modality(mut self, modality: crate::pipeline::segmentation::Modality) -> Self {
        self.configuration.modality = modality;
        self
    }

    // Overrides the configured capture rate.
    pub fn target_fps(mut self, target_fps: u32) -> Self {
        self.configuration.target_fps = target_fps;
        self
    }

    // Overrides the configured buffer capacity.
    pub fn frame_buffer_capacity(mut self, capacity: usize) -> Self {
        self.configuration.frame_buffer_capacity = capacity;
        self
    }

    pub fn analysis_type(mut self, analysis_type: AnalysisType) -> Self {
        self.analysis_type = analysis_type;
        self
    }

    /// Replaces the configured frame source.
    pub fn producer(mut self, producer: Box<dyn FrameProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Replaces the endpoint-derived vision backend.
    pub fn backend(mut self, backend: Arc<dyn VisionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<Coordinator, AppError> {
        let configuration = self.configuration;

        let producer: Box<dyn FrameProducer> = match self.producer {
            Some(producer) => producer,
            None if configuration.source_path.is_empty() => {
                let (width, height) = configuration.resolution;
                Box::new(SyntheticSource::new(width, height))
            }
            None => Box::new(FileLoopSource::from_directory(&configuration.source_path)?),
        };

        let backend: Option<Arc<dyn VisionBackend>> = match self.backend {
            Some(backend) => Some(backend),
            None => configuration
                .vision_endpoint
                .as_ref()
                .map(|endpoint| {
                    Arc::new(HttpVisionBackend::new(endpoint.clone())) as Arc<dyn VisionBackend>
                }),
        };

        Ok(Coordinator::new(
            configuration,
            producer,
            backend,
            self.analysis_type,
        ))
    }
}
