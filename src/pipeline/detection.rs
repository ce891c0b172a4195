use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical alert priority, ordered highest first. External severity
/// vocabularies are normalized into this enum at the extraction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Caution,
    Info,
}

impl AlertSeverity {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "critical" => AlertSeverity::Critical,
            "warning" | "high" => AlertSeverity::Warning,
            "caution" | "moderate" => AlertSeverity::Caution,
            _ => AlertSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_message: Option<String>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            voice_message: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice_message = Some(voice.into());
        self
    }
}

/// Coarse classification of a detected structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureCategory {
    Pathology,
    Vessel,
    Parenchyma,
    CsfSpace,
    Instrument,
    Other,
}

impl StructureCategory {
    /// Classification by structure name, from the fixed domain table.
    pub fn classify(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "tumor" | "enhancement" | "edema" | "necrotic" => StructureCategory::Pathology,
            "blood" | "vessels" | "vessel" => StructureCategory::Vessel,
            "tissue" | "parenchyma" => StructureCategory::Parenchyma,
            "csf" | "ventricles" => StructureCategory::CsfSpace,
            "instrument" => StructureCategory::Instrument,
            _ => StructureCategory::Other,
        }
    }
}

/// One connected region of one structure in one frame. A pure read-only fact
/// about that frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionInstance {
    pub centroid: (u32, u32),
    /// x, y, width, height, always within frame bounds.
    pub bounding_box: (u32, u32, u32, u32),
    pub area: u32,
    pub perimeter: u32,
}

/// The canonical detection record, merged from local segmentation and the
/// external vision service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureDetection {
    pub name: String,
    pub category: StructureCategory,
    pub centroid: (u32, u32),
    pub bounding_box: (u32, u32, u32, u32),
    pub area: u32,
    pub confidence: f32,
    pub is_critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_margin_mm: Option<f32>,
    pub source: DetectionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Segmentation,
    VisionService,
}

/// Requested depth of per-frame analysis. Unknown request strings resolve to
/// `Hybrid` rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Segmentation,
    Vision,
    Hybrid,
    SafetyCheck,
    Navigation,
}

impl AnalysisType {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "segmentation" => AnalysisType::Segmentation,
            "vision" | "external" => AnalysisType::Vision,
            "hybrid" => AnalysisType::Hybrid,
            "safety_check" | "safety" => AnalysisType::SafetyCheck,
            "navigation" => AnalysisType::Navigation,
            other => {
                tracing::warn!("Unknown analysis type '{other}', defaulting to hybrid");
                AnalysisType::Hybrid
            }
        }
    }

    pub fn wants_local(&self) -> bool {
        matches!(
            self,
            AnalysisType::Segmentation | AnalysisType::Hybrid | AnalysisType::Navigation
        )
    }

    pub fn wants_external(&self) -> bool {
        matches!(
            self,
            AnalysisType::Vision | AnalysisType::Hybrid | AnalysisType::SafetyCheck
        )
    }
}

/// Per-frame aggregate. Immutable after construction; consumed by reporters
/// and never mutated downstream.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: f64,
    pub analysis_type: AnalysisType,
    pub safety_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technique_score: Option<f64>,
    pub structures: Vec<StructureDetection>,
    pub instruments: Vec<serde_json::Value>,
    pub alerts: Vec<Alert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_alert: Option<String>,
    /// Raw external-service payload, when one was available for this frame.
    /// `None` signals degraded, local-only quality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_analysis: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryWarning {
    pub structure: String,
    pub distance_px: u32,
    pub point: (u32, u32),
    pub severity: AlertSeverity,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryValidation {
    pub is_safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_distance_to_critical_px: Option<u32>,
    pub warnings: Vec<TrajectoryWarning>,
    pub recommendation: String,
}
