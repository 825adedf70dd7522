//! Configuration resolution for pixa-ai
//!
//! Builds the runtime settings of every backend from the bootstrap TOML
//! config. The cloud API key is resolved from two tiers:
//! environment variable, then TOML.

use crate::backends::{CloudSettings, OnDeviceSettings};
use crate::types::EnginePreference;
use pixa_common::config::{
    load_toml_config, resolve_root_folder, write_toml_config, ModelsConfig, RuntimeConfig,
    TomlConfig,
};
use pixa_common::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable holding the cloud API key
pub const CLOUD_API_KEY_ENV_VAR: &str = "PIXA_CLOUD_API_KEY";

/// Fully resolved settings for [`AiServices`](crate::AiServices)
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub root_folder: PathBuf,
    pub engine_preference: EnginePreference,
    pub cloud: CloudSettings,
    pub on_device: OnDeviceSettings,
    pub runtime: RuntimeConfig,
    pub models: ModelsConfig,
}

impl AiConfig {
    /// Resolve from the TOML config plus environment
    ///
    /// `root_arg` is the command-line root folder, if any.
    pub fn resolve(root_arg: Option<&Path>, toml_config: &TomlConfig) -> Self {
        let inference = &toml_config.inference;

        Self {
            root_folder: resolve_root_folder(root_arg, toml_config),
            engine_preference: resolve_engine_preference(toml_config),
            cloud: CloudSettings {
                api_url: inference.cloud_api_url.clone(),
                model: inference.cloud_model.clone(),
                api_key: resolve_cloud_api_key(toml_config),
                requests_per_minute: inference.cloud_requests_per_minute,
            },
            on_device: OnDeviceSettings {
                enabled: inference.on_device_enabled,
                endpoint: inference.on_device_endpoint.clone(),
                model: inference.on_device_model.clone(),
            },
            runtime: toml_config.runtime.clone(),
            models: toml_config.models.clone(),
        }
    }
}

/// Resolve the cloud API key
///
/// **Priority:** ENV → TOML. `None` leaves the cloud backend unavailable.
pub fn resolve_cloud_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(CLOUD_API_KEY_ENV_VAR)
        .ok()
        .filter(|key| is_valid_key(key));
    let toml_key = toml_config
        .cloud_api_key
        .as_ref()
        .filter(|key| is_valid_key(key));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Cloud API key found in both environment and TOML. Using environment (highest priority).");
    }

    if let Some(key) = env_key {
        info!("Cloud API key loaded from environment variable");
        return Some(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("Cloud API key loaded from TOML config");
        return Some(key.trim().to_string());
    }

    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Engine preference from TOML; unknown values fall back to `Auto`
pub fn resolve_engine_preference(toml_config: &TomlConfig) -> EnginePreference {
    let raw = &toml_config.inference.engine_preference;
    match raw.parse() {
        Ok(preference) => preference,
        Err(e) => {
            warn!(value = %raw, error = %e, "Invalid engine preference, using auto");
            EnginePreference::Auto
        }
    }
}

/// Persist the engine preference into the TOML config file
///
/// Other settings in the file are preserved.
pub fn save_engine_preference(preference: EnginePreference, toml_path: &Path) -> Result<()> {
    let mut config = load_toml_config(toml_path)?;
    config.inference.engine_preference = preference.as_str().to_string();
    write_toml_config(&config, toml_path)?;
    info!(preference = %preference, "Engine preference saved to {}", toml_path.display());
    Ok(())
}
