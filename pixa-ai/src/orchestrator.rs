//! Inference Fallback Orchestrator
//!
//! Resolves the engine preference to an ordered list of backends and tries
//! them one after another until one returns usable data. Backend failures
//! are logged and skipped; only exhaustion reaches the caller.
//!
//! # Attempt Order
//! | Preference     | Backends tried              |
//! |----------------|-----------------------------|
//! | `Auto`         | cloud → on-device → local   |
//! | `CloudOnly`    | cloud                       |
//! | `OnDeviceOnly` | on-device                   |
//! | `LocalOnly`    | local                       |
//! | `None`         | (nothing, `NotAvailable`)   |
//!
//! Within a slot only backends supporting the input kind are tried.

use crate::error::{InferenceError, InferenceResult};
use crate::quality_gate::TextQualityGate;
use crate::types::{
    BackendDescriptor, EnginePreference, ExtractedResult, InferenceBackend, InferencePayload,
    InputKind,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sequential backend fallback
pub struct FallbackOrchestrator {
    backends: Vec<Arc<dyn InferenceBackend>>,
    quality_gate: TextQualityGate,
}

impl FallbackOrchestrator {
    /// Create an orchestrator over `backends`
    ///
    /// Registration order breaks ties between backends sharing a slot.
    pub fn new(backends: Vec<Arc<dyn InferenceBackend>>) -> Self {
        Self {
            backends,
            quality_gate: TextQualityGate::new(),
        }
    }

    pub fn with_quality_gate(mut self, quality_gate: TextQualityGate) -> Self {
        self.quality_gate = quality_gate;
        self
    }

    pub fn quality_gate(&self) -> &TextQualityGate {
        &self.quality_gate
    }

    /// Backends that would be tried for `preference` and `input`, in order
    pub fn candidates(
        &self,
        preference: EnginePreference,
        input: InputKind,
    ) -> Vec<Arc<dyn InferenceBackend>> {
        preference
            .backend_order()
            .iter()
            .flat_map(|kind| {
                self.backends
                    .iter()
                    .filter(move |b| b.kind() == *kind && b.supports(input))
            })
            .cloned()
            .collect()
    }

    /// Run the fallback chain for one input
    pub async fn extract(
        &self,
        preference: EnginePreference,
        payload: InferencePayload<'_>,
    ) -> InferenceResult<ExtractedResult> {
        let input = payload.kind();
        if preference == EnginePreference::None {
            debug!("Inference disabled by preference");
            return Err(InferenceError::NotAvailable);
        }

        let mut last_failure: Option<InferenceError> = None;

        for backend in self.candidates(preference, input) {
            let name = backend.name();

            if !backend.is_available().await {
                debug!(backend = name, input = %input, "Backend unavailable, skipping");
                continue;
            }

            let attempt = match payload {
                InferencePayload::Text(text) => backend.extract_from_text(text).await,
                InferencePayload::Image(image) => backend.extract_from_image(image).await,
            };

            match attempt {
                Ok(result) if result.has_valid_data() => {
                    info!(
                        backend = name,
                        input = %input,
                        tags = result.tags().len(),
                        has_description = result.description().is_some(),
                        "Extraction succeeded"
                    );
                    return Ok(result);
                }
                Ok(_) => {
                    debug!(backend = name, input = %input, "Backend returned no data, trying next");
                }
                Err(e) => {
                    warn!(backend = name, input = %input, error = %e, "Backend failed, trying next");
                    if !e.is_availability() {
                        last_failure = Some(e);
                    }
                }
            }
        }

        match last_failure {
            Some(e) if preference.is_single_backend() => Err(match e {
                InferenceError::ExtractionFailed(reason) => InferenceError::ExtractionFailed(reason),
                other => InferenceError::ExtractionFailed(other.to_string()),
            }),
            _ => Err(InferenceError::NotAvailable),
        }
    }

    /// Tag extraction from recognized text
    pub async fn extract_from_text(
        &self,
        preference: EnginePreference,
        text: &str,
    ) -> InferenceResult<ExtractedResult> {
        self.extract(preference, InferencePayload::Text(text)).await
    }

    /// Tag extraction directly from image bytes
    pub async fn extract_from_image(
        &self,
        preference: EnginePreference,
        image: &[u8],
    ) -> InferenceResult<ExtractedResult> {
        self.extract(preference, InferencePayload::Image(image)).await
    }

    /// Image-native extraction first, then text extraction as a fallback
    ///
    /// The text path runs only when no image backend produced data and the
    /// recognized text passes the quality gate.
    pub async fn extract_best_method(
        &self,
        preference: EnginePreference,
        image: Option<&[u8]>,
        recognized_text: Option<&str>,
    ) -> InferenceResult<ExtractedResult> {
        let mut image_error = None;

        if let Some(image) = image {
            match self.extract_from_image(preference, image).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    debug!(error = %e, "No image-native result, considering text");
                    image_error = Some(e);
                }
            }
        }

        match recognized_text {
            Some(text) if self.quality_gate.is_usable(text) => {
                self.extract_from_text(preference, text).await
            }
            Some(_) => {
                debug!("Recognized text rejected by quality gate");
                Err(image_error.unwrap_or(InferenceError::NotAvailable))
            }
            None => Err(image_error.unwrap_or(InferenceError::NotAvailable)),
        }
    }

    /// Name of the first backend that would run right now
    pub async fn available_backend_name(
        &self,
        preference: EnginePreference,
        input: InputKind,
    ) -> Option<&'static str> {
        for backend in self.candidates(preference, input) {
            if backend.is_available().await {
                return Some(backend.name());
            }
        }
        None
    }

    /// Whether any backend for `preference` can run, for either input kind
    pub async fn is_any_backend_available(&self, preference: EnginePreference) -> bool {
        for input in [InputKind::Image, InputKind::Text] {
            if self.available_backend_name(preference, input).await.is_some() {
                return true;
            }
        }
        false
    }

    /// Descriptors of all registered backends (probes availability)
    pub async fn describe_backends(&self) -> Vec<BackendDescriptor> {
        let mut descriptors = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            descriptors.push(backend.descriptor().await);
        }
        descriptors
    }
}
