use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::error::VisionError;
use crate::pipeline::detection::AnalysisType;
use crate::pipeline::segmentation::Modality;
use crate::pipeline::vision::extract;

/// One outbound analysis request. The image is already JPEG-encoded so the
/// backend never touches pixel buffers.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub frame_id: u64,
    pub image_jpeg: Vec<u8>,
    pub analysis_type: AnalysisType,
    pub modality: Modality,
}

/// A remote analysis provider. Implementations return the provider's raw
/// JSON payload; normalization happens in [`extract`].
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn analyze(&self, request: VisionRequest) -> Result<serde_json::Value, VisionError>;

    fn describe(&self) -> String;
}

/// Analysis focus sent along with the frame. The provider is free-form, so
/// the instruction pins down which fields we expect back.
pub fn instruction_for(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::SafetyCheck => {
            "Assess surgical safety in this operating field frame. Check sterile \
             field integrity, possible contamination, instrument positions and \
             personnel. Respond with JSON containing safety_score (0-100), \
             alerts, instruments and guidance."
        }
        AnalysisType::Navigation => {
            "Identify anatomical structures in this intraoperative frame and \
             estimate distances from the instrument tip to each critical \
             structure. Respond with JSON containing structures, \
             proximity_warnings, guidance and safety_score (0-100)."
        }
        AnalysisType::Vision | AnalysisType::Hybrid => {
            "Analyze this surgical frame. Identify visible anatomical \
             structures, instruments and any safety concerns. Respond with \
             JSON containing structures, instruments, alerts, safety_score \
             (0-100) and guidance."
        }
        AnalysisType::Segmentation => {
            "Describe the anatomical regions visible in this frame. Respond \
             with JSON containing structures and safety_score (0-100)."
        }
    }
}

/// HTTP JSON backend. Posts the frame as base64 with an instruction and
/// recovers a JSON object from whatever text comes back.
pub struct HttpVisionBackend {
    client: Client,
    endpoint: String,
}

impl HttpVisionBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl VisionBackend for HttpVisionBackend {
    async fn analyze(&self, request: VisionRequest) -> Result<serde_json::Value, VisionError> {
        let body = json!({
            "image": BASE64.encode(&request.image_jpeg),
            "media_type": "image/jpeg",
            "instruction": instruction_for(request.analysis_type),
            "modality": request.modality.as_str(),
        });

        debug!(
            frame_id = request.frame_id,
            endpoint = %self.endpoint,
            bytes = request.image_jpeg.len(),
            "Sending frame for remote analysis"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::Request(format!(
                "endpoint returned {status}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;
        extract::recover_json(&text)
    }

    fn describe(&self) -> String {
        format!("http backend at {}", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_request_a_safety_score() {
        for t in [
            AnalysisType::SafetyCheck,
            AnalysisType::Navigation,
            AnalysisType::Hybrid,
            AnalysisType::Segmentation,
        ] {
            assert!(instruction_for(t).contains("safety_score"));
        }
    }
}
