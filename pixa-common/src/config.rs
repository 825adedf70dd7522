//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never aborts startup: it is logged and
//! built-in defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_ENV_VAR: &str = "PIXA_ROOT";

/// Environment variable overriding the TOML config file location
pub const CONFIG_ENV_VAR: &str = "PIXA_CONFIG";

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "pixa-ai.toml";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for managed data (models, caches)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Cloud inference API key (environment variable takes priority)
    #[serde(default)]
    pub cloud_api_key: Option<String>,

    /// Inference backend selection and endpoints
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Local model runtime commands
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Download source overrides for local model files
    #[serde(default)]
    pub models: ModelsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Inference backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Engine preference: "auto", "cloud", "on_device", "local" or "none"
    #[serde(default = "default_engine_preference")]
    pub engine_preference: String,

    /// Cloud model identifier sent with every request
    #[serde(default = "default_cloud_model")]
    pub cloud_model: String,

    /// Cloud messages endpoint
    #[serde(default = "default_cloud_api_url")]
    pub cloud_api_url: String,

    /// Client-side cap on cloud requests per minute
    #[serde(default = "default_cloud_requests_per_minute")]
    pub cloud_requests_per_minute: u32,

    /// Whether the system-provided on-device model may be used
    #[serde(default = "default_true")]
    pub on_device_enabled: bool,

    /// Base URL of the on-device inference service (loopback only)
    #[serde(default = "default_on_device_endpoint")]
    pub on_device_endpoint: String,

    /// Model name requested from the on-device service
    #[serde(default = "default_on_device_model")]
    pub on_device_model: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            engine_preference: default_engine_preference(),
            cloud_model: default_cloud_model(),
            cloud_api_url: default_cloud_api_url(),
            cloud_requests_per_minute: default_cloud_requests_per_minute(),
            on_device_enabled: true,
            on_device_endpoint: default_on_device_endpoint(),
            on_device_model: default_on_device_model(),
        }
    }
}

/// Local runtime (llama.cpp command line tools) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Text generation command
    #[serde(default = "default_llama_cli")]
    pub llama_cli: String,

    /// Multimodal (image + text) generation command
    #[serde(default = "default_mtmd_cli")]
    pub mtmd_cli: String,

    /// Upper bound for a single local generation, in seconds
    #[serde(default = "default_runtime_timeout")]
    pub timeout_secs: u64,

    /// Worker threads passed to the runtime
    #[serde(default = "default_threads")]
    pub threads: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            llama_cli: default_llama_cli(),
            mtmd_cli: default_mtmd_cli(),
            timeout_secs: default_runtime_timeout(),
            threads: default_threads(),
        }
    }
}

/// Download source overrides (mirrors, air-gapped hosts)
///
/// Unset entries use the built-in catalog URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Text language model file URL
    #[serde(default)]
    pub text_model_url: Option<String>,

    /// Vision language model file URL
    #[serde(default)]
    pub vision_model_url: Option<String>,

    /// Vision projector file URL
    #[serde(default)]
    pub vision_projector_url: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_engine_preference() -> String {
    "auto".to_string()
}

fn default_cloud_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_cloud_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_cloud_requests_per_minute() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_on_device_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_on_device_model() -> String {
    "gemma3:4b".to_string()
}

fn default_llama_cli() -> String {
    "llama-cli".to_string()
}

fn default_mtmd_cli() -> String {
    "llama-mtmd-cli".to_string()
}

fn default_runtime_timeout() -> u64 {
    120
}

fn default_threads() -> u32 {
    4
}

/// Resolve the root folder
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(root_folder) = &toml_config.root_folder {
        return root_folder.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Config file location: `PIXA_CONFIG` or the platform config directory
pub fn config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("pixa").join(CONFIG_FILE_NAME))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load TOML config, falling back to defaults when the file is missing
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/pixa
        dirs::data_local_dir()
            .map(|d| d.join("pixa"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/pixa"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/pixa
        dirs::data_dir()
            .map(|d| d.join("pixa"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/pixa"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\pixa
        dirs::data_local_dir()
            .map(|d| d.join("pixa"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\pixa"))
    } else {
        PathBuf::from("./pixa_data")
    }
}
