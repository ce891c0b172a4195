use thiserror::Error;

// Main application error type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Segmentation error: {0}")]
    Segmentation(#[from] SegmentationError),
    #[error("Vision service error: {0}")]
    Vision(#[from] VisionError),
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

// Frame acquisition error type
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open source {0}: {1}")]
    SourceOpen(String, String),
    #[error("Failed to read frame from source: {0}")]
    FrameRead(String),
    #[error("Source is exhausted")]
    EndOfStream,
    #[error("Capture worker is already running")]
    AlreadyRunning,
    #[error("Capture worker did not stop within {0:?}")]
    StopTimeout(std::time::Duration),
}

#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Mask dimensions {mask_w}x{mask_h} do not match frame {frame_w}x{frame_h}")]
    DimensionMismatch {
        frame_w: u32,
        frame_h: u32,
        mask_w: u32,
        mask_h: u32,
    },
    #[error("Malformed image buffer: {0}")]
    MalformedBuffer(String),
}

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Failed to decode response payload: {0}")]
    MalformedResponse(String),
    #[error("Failed to encode frame for upload: {0}")]
    FrameEncoding(String),
}
