use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::pipeline::segmentation::Modality;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub source_path: String,
    pub modality: Modality,
    pub frame_buffer_capacity: usize,
    pub target_fps: u32,
    pub resolution: (u32, u32),
    pub jpeg_quality: u8,
    /// Minimum spacing between external vision calls, in milliseconds.
    pub external_interval_ms: u64,
    /// Per-call budget for the external vision service, in milliseconds.
    pub external_timeout_ms: u64,
    pub vision_endpoint: Option<String>,
    pub min_region_area: u32,
    /// Inter-phase delay for streamed reports, in milliseconds.
    pub yield_interval_ms: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            source_path: String::new(),
            modality: Modality::OrCamera,
            frame_buffer_capacity: 30,
            target_fps: 30,
            resolution: (1280, 720),
            jpeg_quality: 85,
            external_interval_ms: 500,
            external_timeout_ms: 800,
            vision_endpoint: None,
            min_region_area: 300,
            yield_interval_ms: 100,
        }
    }
}

impl Configuration {
    /// Loads configuration from an optional `neurovision.toml` next to the
    /// binary, with `NEUROVISION_*` environment variables taking precedence.
    pub fn load() -> Result<Self, AppError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("neurovision").required(false))
            .add_source(config::Environment::with_prefix("NEUROVISION"))
            .build()
            .map_err(|e| AppError::Pipeline(format!("Failed to read configuration: {e}")))?;

        match settings.try_deserialize() {
            Ok(configuration) => Ok(configuration),
            Err(e) => {
                tracing::warn!("Invalid configuration, using defaults: {e}");
                Ok(Self::default())
            }
        }
    }

    pub fn external_interval(&self) -> Duration {
        Duration::from_millis(self.external_interval_ms)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }

    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_capacity_is_thirty() {
        let configuration = Configuration::default();
        assert_eq!(configuration.frame_buffer_capacity, 30);
        assert_eq!(configuration.external_interval(), Duration::from_millis(500));
    }
}
