//! pixa-ai library
//!
//! Photo auto-tagging inference core:
//! - [`orchestrator`]: preference-driven fallback across inference backends
//! - [`backends`]: cloud, on-device and local model backends
//! - [`artifacts`]: download and lifecycle of local model files
//! - [`tags`]: normalization, validation and heuristic tag sources
//! - [`coordinator`]: per-photo tagging pipeline
//!
//! [`AiServices`] wires everything together once; the binary and host
//! applications share it through `Arc`s.

pub mod artifacts;
pub mod backends;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod orchestrator;
pub mod quality_gate;
pub mod tags;
pub mod types;

pub use crate::error::{InferenceError, InferenceResult};
pub use crate::types::{
    BackendDescriptor, BackendKind, EnginePreference, ExtractedResult, InferenceBackend,
    InferencePayload, InputKind,
};

use crate::artifacts::{models_root, ArtifactSpec, ModelArtifactManager};
use crate::backends::{
    CloudBackend, LlamaCliRuntime, LocalRuntime, LocalTextBackend, LocalVisionBackend,
    OnDeviceBackend,
};
use crate::config::AiConfig;
use crate::coordinator::{AutoTaggingCoordinator, PhotoStore};
use crate::orchestrator::FallbackOrchestrator;
use pixa_common::events::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Composition root
///
/// Each component is constructed exactly once here.
pub struct AiServices {
    pub config: AiConfig,
    pub event_bus: EventBus,
    pub text_model: ModelArtifactManager,
    pub vision_model: ModelArtifactManager,
    pub orchestrator: Arc<FallbackOrchestrator>,
    preference_tx: watch::Sender<EnginePreference>,
}

impl AiServices {
    pub fn new(config: AiConfig, event_bus: EventBus) -> InferenceResult<Self> {
        let runtime: Arc<dyn LocalRuntime> = Arc::new(LlamaCliRuntime::new(&config.runtime));
        Self::with_runtime(config, event_bus, runtime)
    }

    /// Same as [`AiServices::new`] with a caller-supplied local runtime
    pub fn with_runtime(
        config: AiConfig,
        event_bus: EventBus,
        runtime: Arc<dyn LocalRuntime>,
    ) -> InferenceResult<Self> {
        // Whole-file transfers run for minutes, so only connecting is bounded
        let download_client = reqwest::Client::builder()
            .user_agent(concat!("pixa-ai/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(DOWNLOAD_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::DownloadFailed(format!("HTTP client: {}", e)))?;

        let models_root = models_root(&config.root_folder);
        let text_model = ModelArtifactManager::new(
            ArtifactSpec::text_model().with_overrides(&config.models),
            &models_root,
            download_client.clone(),
            event_bus.clone(),
        );
        let vision_model = ModelArtifactManager::new(
            ArtifactSpec::vision_model().with_overrides(&config.models),
            &models_root,
            download_client,
            event_bus.clone(),
        );

        // Registration order breaks ties inside a preference slot
        let backends: Vec<Arc<dyn InferenceBackend>> = vec![
            Arc::new(CloudBackend::new(config.cloud.clone())?),
            Arc::new(OnDeviceBackend::new(config.on_device.clone())?),
            Arc::new(LocalTextBackend::new(text_model.clone(), runtime.clone())),
            Arc::new(LocalVisionBackend::new(vision_model.clone(), runtime)),
        ];
        let orchestrator = Arc::new(FallbackOrchestrator::new(backends));

        let (preference_tx, _) = watch::channel(config.engine_preference);

        info!(
            root = %config.root_folder.display(),
            preference = %config.engine_preference,
            "AI services initialized"
        );

        Ok(Self {
            config,
            event_bus,
            text_model,
            vision_model,
            orchestrator,
            preference_tx,
        })
    }

    pub fn preference(&self) -> EnginePreference {
        *self.preference_tx.borrow()
    }

    /// Change the active preference; running coordinators pick it up on
    /// their next photo
    pub fn set_preference(&self, preference: EnginePreference) {
        self.preference_tx.send_replace(preference);
    }

    /// Managers for every local model family
    pub fn artifact_managers(&self) -> [&ModelArtifactManager; 2] {
        [&self.text_model, &self.vision_model]
    }

    /// Manager for a family name (`text` or `vision`)
    pub fn artifact_manager(&self, family: &str) -> Option<&ModelArtifactManager> {
        self.artifact_managers()
            .into_iter()
            .find(|manager| manager.family() == family)
    }

    /// Tagging coordinator persisting into `store`
    pub fn coordinator(&self, store: Arc<dyn PhotoStore>) -> AutoTaggingCoordinator {
        AutoTaggingCoordinator::new(
            self.orchestrator.clone(),
            store,
            self.preference_tx.subscribe(),
            self.event_bus.clone(),
        )
    }
}
