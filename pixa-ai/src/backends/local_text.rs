//! Local text language model backend
//!
//! Runs the downloaded single-file language model through the local runtime.
//! Available exactly when the model file is on disk.

use super::prompts::{local_chat_prompt, text_prompt};
use super::response_parser::parse_model_response;
use super::runtime::LocalRuntime;
use crate::artifacts::{FileRole, ModelArtifactManager};
use crate::error::{InferenceError, InferenceResult};
use crate::types::{BackendKind, ExtractedResult, InferenceBackend};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct LocalTextBackend {
    artifacts: ModelArtifactManager,
    runtime: Arc<dyn LocalRuntime>,
}

impl LocalTextBackend {
    pub fn new(artifacts: ModelArtifactManager, runtime: Arc<dyn LocalRuntime>) -> Self {
        Self { artifacts, runtime }
    }
}

#[async_trait]
impl InferenceBackend for LocalTextBackend {
    fn name(&self) -> &'static str {
        "Local language model"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn supports_text(&self) -> bool {
        true
    }

    fn supports_image(&self) -> bool {
        false
    }

    async fn is_available(&self) -> bool {
        self.artifacts.is_complete()
    }

    async fn extract_from_text(&self, text: &str) -> InferenceResult<ExtractedResult> {
        if !self.artifacts.is_complete() {
            return Err(InferenceError::ModelNotLoaded);
        }
        let model = self
            .artifacts
            .file_path(FileRole::LanguageModel)
            .ok_or(InferenceError::ModelNotLoaded)?;

        let prompt = local_chat_prompt(&text_prompt(text));
        debug!(model = %model.display(), "Running local text generation");

        let answer = self.runtime.generate_text(&model, &prompt).await?;
        Ok(parse_model_response(&answer))
    }
}
