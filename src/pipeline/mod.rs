pub mod detection;
pub mod orchestrator;
pub mod reporter;
pub mod segmentation;
pub mod vision;

pub use detection::{AnalysisResult, AnalysisType, StructureDetection, TrajectoryValidation};
pub use orchestrator::AnalysisOrchestrator;
pub use reporter::{ReportEvent, ReportProfile, StreamingReporter};
