//! On-device system model backend
//!
//! Talks to the inference service the operating system (or a local daemon)
//! exposes on loopback. The service has no system role, so the rules and the
//! text prompt are sent as one prompt. Text only.

use super::prompts::combined_text_prompt;
use super::response_parser::parse_model_response;
use crate::error::{InferenceError, InferenceResult};
use crate::types::{BackendKind, ExtractedResult, InferenceBackend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Version probe must answer within this
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct OnDeviceSettings {
    pub enabled: bool,
    /// Base URL, e.g. `http://127.0.0.1:11434`
    pub endpoint: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OnDeviceBackend {
    client: reqwest::Client,
    settings: OnDeviceSettings,
}

impl OnDeviceBackend {
    pub fn new(settings: OnDeviceSettings) -> InferenceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ExtractionFailed(format!("HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl InferenceBackend for OnDeviceBackend {
    fn name(&self) -> &'static str {
        "On-device model"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::OnDevice
    }

    fn supports_text(&self) -> bool {
        true
    }

    fn supports_image(&self) -> bool {
        false
    }

    async fn is_available(&self) -> bool {
        if !self.settings.enabled {
            return false;
        }

        let probe = self
            .client
            .get(self.url("/api/version"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match probe {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(endpoint = %self.settings.endpoint, error = %e, "On-device service not reachable");
                false
            }
        }
    }

    async fn extract_from_text(&self, text: &str) -> InferenceResult<ExtractedResult> {
        let request = GenerateRequest {
            model: &self.settings.model,
            prompt: combined_text_prompt(text),
            stream: false,
            options: GenerateOptions { temperature: 0.3 },
        };

        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::ExtractionFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::ExtractionFailed(format!(
                "service error: {}",
                status.as_u16()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|_| InferenceError::InvalidResponse)?;

        debug!(chars = body.response.len(), "On-device model answered");
        Ok(parse_model_response(&body.response))
    }
}
