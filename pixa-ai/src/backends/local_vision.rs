//! Local vision language model backend
//!
//! Needs both files of the vision family (language model + projector). The
//! photo is written to a temporary file for the runtime and removed after the
//! run. Results get a fixed confidence bonus for reading the image directly.

use super::prompts::{IMAGE_PROMPT, SYSTEM_PROMPT};
use super::response_parser::parse_model_response;
use super::runtime::LocalRuntime;
use crate::artifacts::download::remove_if_exists;
use crate::artifacts::{FileRole, ModelArtifactManager};
use crate::error::{InferenceError, InferenceResult};
use crate::types::{BackendKind, ExtractedResult, InferenceBackend};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Confidence added to image-native results
pub const VISION_CONFIDENCE_BONUS: f32 = 0.2;

pub struct LocalVisionBackend {
    artifacts: ModelArtifactManager,
    runtime: Arc<dyn LocalRuntime>,
    scratch_dir: PathBuf,
}

impl LocalVisionBackend {
    pub fn new(artifacts: ModelArtifactManager, runtime: Arc<dyn LocalRuntime>) -> Self {
        Self {
            artifacts,
            runtime,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Directory for temporary image files
    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = dir;
        self
    }
}

#[async_trait]
impl InferenceBackend for LocalVisionBackend {
    fn name(&self) -> &'static str {
        "Local vision model"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn supports_text(&self) -> bool {
        false
    }

    fn supports_image(&self) -> bool {
        true
    }

    async fn is_available(&self) -> bool {
        self.artifacts.is_complete()
    }

    async fn extract_from_text(&self, _text: &str) -> InferenceResult<ExtractedResult> {
        Err(InferenceError::NotAvailable)
    }

    async fn extract_from_image(&self, image: &[u8]) -> InferenceResult<ExtractedResult> {
        if !self.artifacts.is_complete() {
            return Err(InferenceError::ModelNotLoaded);
        }
        let (Some(model), Some(projector)) = (
            self.artifacts.file_path(FileRole::LanguageModel),
            self.artifacts.file_path(FileRole::VisionProjector),
        ) else {
            return Err(InferenceError::ModelNotLoaded);
        };

        let extension = infer::get(image).map(|k| k.extension()).unwrap_or("jpg");
        let image_path = self
            .scratch_dir
            .join(format!("pixa_{}.{}", uuid::Uuid::new_v4(), extension));
        tokio::fs::write(&image_path, image).await?;

        debug!(image = %image_path.display(), "Running local vision generation");
        let prompt = format!("{}\n\n{}", SYSTEM_PROMPT, IMAGE_PROMPT);
        let answer = self
            .runtime
            .generate_with_image(&model, &projector, &image_path, &prompt)
            .await;

        remove_if_exists(&image_path).await;

        let result = parse_model_response(&answer?);
        if result.has_valid_data() {
            Ok(result.with_confidence_bonus(VISION_CONFIDENCE_BONUS))
        } else {
            Ok(result)
        }
    }
}
