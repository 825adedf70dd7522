//! Host-side collaborators for integration tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pixa_ai::backends::LocalRuntime;
use pixa_ai::coordinator::PhotoStore;
use pixa_ai::InferenceResult;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// Photo store keeping everything in memory
#[derive(Default)]
pub struct RecordingStore {
    pub tags: Mutex<Vec<(Uuid, String)>>,
    pub descriptions: Mutex<Vec<(Uuid, String)>>,
    pub extracted_text: Mutex<Vec<(Uuid, String)>>,
}

impl RecordingStore {
    pub fn tag_names(&self) -> Vec<String> {
        self.tags
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl PhotoStore for RecordingStore {
    async fn add_tag(&self, name: &str, photo_id: Uuid) -> pixa_common::Result<()> {
        self.tags.lock().unwrap().push((photo_id, name.to_string()));
        Ok(())
    }

    async fn update_description(
        &self,
        photo_id: Uuid,
        text: &str,
        _timestamp: DateTime<Utc>,
    ) -> pixa_common::Result<()> {
        self.descriptions
            .lock()
            .unwrap()
            .push((photo_id, text.to_string()));
        Ok(())
    }

    async fn update_extracted_text(
        &self,
        photo_id: Uuid,
        text: &str,
        _timestamp: DateTime<Utc>,
    ) -> pixa_common::Result<()> {
        self.extracted_text
            .lock()
            .unwrap()
            .push((photo_id, text.to_string()));
        Ok(())
    }
}

/// A local runtime call as seen by [`ScriptedRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Text { model: String },
    Image { model: String, projector: String, image_existed: bool },
}

/// Local runtime returning canned model output
pub struct ScriptedRuntime {
    text_answer: String,
    image_answer: String,
    calls: Mutex<Vec<RuntimeCall>>,
}

impl ScriptedRuntime {
    pub fn new(text_answer: &str, image_answer: &str) -> Self {
        Self {
            text_answer: text_answer.to_string(),
            image_answer: image_answer.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl LocalRuntime for ScriptedRuntime {
    async fn generate_text(&self, model: &Path, _prompt: &str) -> InferenceResult<String> {
        self.calls.lock().unwrap().push(RuntimeCall::Text {
            model: file_name(model),
        });
        Ok(self.text_answer.clone())
    }

    async fn generate_with_image(
        &self,
        model: &Path,
        projector: &Path,
        image: &Path,
        _prompt: &str,
    ) -> InferenceResult<String> {
        self.calls.lock().unwrap().push(RuntimeCall::Image {
            model: file_name(model),
            projector: file_name(projector),
            image_existed: image.is_file(),
        });
        Ok(self.image_answer.clone())
    }
}
