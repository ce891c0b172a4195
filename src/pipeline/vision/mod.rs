pub mod backend;
pub mod extract;
pub mod service;

pub use backend::{HttpVisionBackend, VisionBackend, VisionRequest};
pub use service::{flatten_error, VisionService};
