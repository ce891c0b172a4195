pub mod buffer;
pub mod frame;
pub mod source;
pub mod worker;

pub use buffer::{BufferStatus, FrameBuffer};
pub use frame::Frame;
pub use source::{FileLoopSource, FrameProducer, SyntheticSource};
pub use worker::{CaptureStatus, CaptureWorker};
