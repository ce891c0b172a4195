use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::capture::{BufferStatus, CaptureStatus};
use crate::pipeline::orchestrator::OrchestratorStatus;

/// Point-in-time snapshot of the whole pipeline. Assembled on demand and
/// safe to serialize for status endpoints or logs.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub source: String,
    pub resolution: (u32, u32),
    pub target_fps: u32,
    pub capture: CaptureStatus,
    pub buffer: BufferStatus,
    pub analysis: OrchestratorStatus,
}
