pub mod engine;
pub mod ops;
pub mod thresholds;

pub use engine::{SegmentationEngine, DEFAULT_MIN_AREA, DEFAULT_OVERLAY_ALPHA};
pub use thresholds::{structure_color, IntensityBand, Modality, ThresholdTable};
