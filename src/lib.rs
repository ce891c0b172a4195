pub mod capture;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod status;

pub use config::Configuration;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::AppError;
pub use status::PipelineStatus;
