//! Auto-tagging coordinator
//!
//! Runs once per imported photo: EXIF heuristics and text-derived tags
//! (hashtags, keywords) first, then the fallback orchestrator, then the
//! normalization pipeline. Results go to the [`PhotoStore`].
//!
//! Inference failure is soft. A photo with no reachable backend still gets
//! its heuristic tags.

use crate::orchestrator::FallbackOrchestrator;
use crate::tags::{extract_hashtags, extract_keywords, normalize_tags, ExifHeuristics};
use crate::types::{EnginePreference, ExtractedResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pixa_common::events::{EventBus, PixaEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Optical text recognition, provided by the host application
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize_text(&self, image: &[u8]) -> pixa_common::Result<String>;

    /// Recognition with language-model correction, when the engine has one
    async fn recognize_text_with_correction(&self, image: &[u8]) -> pixa_common::Result<String> {
        self.recognize_text(image).await
    }
}

/// Persistence of tagging results, provided by the host application
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn add_tag(&self, name: &str, photo_id: Uuid) -> pixa_common::Result<()>;

    async fn update_description(
        &self,
        photo_id: Uuid,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> pixa_common::Result<()>;

    async fn update_extracted_text(
        &self,
        photo_id: Uuid,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> pixa_common::Result<()>;
}

/// Per-photo tagging pipeline
pub struct AutoTaggingCoordinator {
    orchestrator: Arc<FallbackOrchestrator>,
    heuristics: ExifHeuristics,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    store: Arc<dyn PhotoStore>,
    preference: watch::Receiver<EnginePreference>,
    event_bus: EventBus,
}

impl AutoTaggingCoordinator {
    /// The preference is read on every photo, so settings changes apply
    /// to the next photo without rebuilding the coordinator.
    pub fn new(
        orchestrator: Arc<FallbackOrchestrator>,
        store: Arc<dyn PhotoStore>,
        preference: watch::Receiver<EnginePreference>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            orchestrator,
            heuristics: ExifHeuristics::default(),
            recognizer: None,
            store,
            preference,
            event_bus,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_heuristics(mut self, heuristics: ExifHeuristics) -> Self {
        self.heuristics = heuristics;
        self
    }

    /// Current engine preference
    pub fn preference(&self) -> EnginePreference {
        *self.preference.borrow()
    }

    /// Tags and description for one photo, never failing
    ///
    /// Inferred tags come first, followed by hashtags, keywords and EXIF
    /// tags. Everything passes through normalization and validation.
    pub async fn extract_tags_best_effort(
        &self,
        photo_id: Uuid,
        image_bytes: &[u8],
        recognized_text: Option<&str>,
    ) -> ExtractedResult {
        let mut heuristic_tags = Vec::new();
        if let Some(text) = recognized_text {
            heuristic_tags.extend(extract_hashtags(text));
            heuristic_tags.extend(extract_keywords(text));
        }
        heuristic_tags.extend(self.heuristics.tags_for_image(image_bytes).await);

        let image = (!image_bytes.is_empty()).then_some(image_bytes);
        let preference = self.preference();

        let inferred = match self
            .orchestrator
            .extract_best_method(preference, image, recognized_text)
            .await
        {
            Ok(result) => Some(result),
            Err(e) if e.is_availability() => {
                debug!(
                    photo_id = %photo_id,
                    preference = %preference,
                    "No inference backend produced data"
                );
                None
            }
            Err(e) => {
                warn!(photo_id = %photo_id, error = %e, "Inference failed, keeping heuristic tags");
                None
            }
        };

        match inferred {
            Some(result) => {
                let merged = normalize_tags(result.tags().iter().cloned().chain(heuristic_tags));
                result.with_tags(merged)
            }
            None => ExtractedResult::new(normalize_tags(heuristic_tags), None),
        }
    }

    /// Recognize text, extract tags and persist them
    pub async fn process_photo(&self, photo_id: Uuid, image_bytes: &[u8]) -> ExtractedResult {
        let recognized_text = self.recognize(photo_id, image_bytes).await;

        let result = self
            .extract_tags_best_effort(photo_id, image_bytes, recognized_text.as_deref())
            .await;

        let mut persisted = 0;
        for tag in result.tags() {
            match self.store.add_tag(tag, photo_id).await {
                Ok(()) => persisted += 1,
                Err(e) => warn!(photo_id = %photo_id, tag = %tag, error = %e, "Failed to store tag"),
            }
        }

        if let Some(description) = result.description() {
            if let Err(e) = self
                .store
                .update_description(photo_id, description, Utc::now())
                .await
            {
                warn!(photo_id = %photo_id, error = %e, "Failed to store description");
            }
        }

        info!(
            photo_id = %photo_id,
            tags = persisted,
            has_description = result.description().is_some(),
            confidence = result.confidence(),
            "Photo tagged"
        );

        self.event_bus.emit_lossy(PixaEvent::PhotoTagged {
            photo_id,
            tag_count: persisted,
            has_description: result.description().is_some(),
            timestamp: Utc::now(),
        });

        result
    }

    /// Tag a photo on a detached task
    ///
    /// Import returns immediately; the handle can be dropped.
    pub fn spawn_tagging(
        self: &Arc<Self>,
        photo_id: Uuid,
        image_bytes: Vec<u8>,
    ) -> JoinHandle<ExtractedResult> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.process_photo(photo_id, &image_bytes).await })
    }

    async fn recognize(&self, photo_id: Uuid, image_bytes: &[u8]) -> Option<String> {
        let recognizer = self.recognizer.as_ref()?;

        let text = match recognizer.recognize_text_with_correction(image_bytes).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(photo_id = %photo_id, error = %e, "Text recognition failed");
                return None;
            }
        };
        if text.is_empty() {
            return None;
        }

        if let Err(e) = self
            .store
            .update_extracted_text(photo_id, &text, Utc::now())
            .await
        {
            warn!(photo_id = %photo_id, error = %e, "Failed to store recognized text");
        }
        Some(text)
    }
}
