//! Built-in catalog of local model families
//!
//! A family is one or two files that must all be present before the local
//! backend using it can run. Files are listed in download order.

use pixa_common::config::ModelsConfig;
use serde::Serialize;
use std::fmt;

/// Role a file plays inside a model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    LanguageModel,
    VisionProjector,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRole::LanguageModel => write!(f, "language model"),
            FileRole::VisionProjector => write!(f, "vision projector"),
        }
    }
}

/// One required file of a model family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub role: FileRole,
    /// Canonical file name inside the managed directory
    pub file_name: String,
    pub url: String,
    /// Approximate size published for the file, in bytes
    pub expected_size: u64,
    /// Lowercase hex SHA-256, when pinned
    pub sha256: Option<String>,
}

impl ArtifactFile {
    /// Anything smaller is treated as a truncated or wrong file
    pub fn min_plausible_size(&self) -> u64 {
        self.expected_size / 2
    }
}

/// A local model family and its required files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Directory name under `<root>/models/`
    pub family: String,
    pub display_name: String,
    /// Required files in download order
    pub files: Vec<ArtifactFile>,
}

impl ArtifactSpec {
    /// Gemma 2B Instruct (text only, single file)
    pub fn text_model() -> Self {
        Self {
            family: "text".to_string(),
            display_name: "Gemma 2B Instruct".to_string(),
            files: vec![ArtifactFile {
                role: FileRole::LanguageModel,
                file_name: "gemma-2b-it-q4_k_m.gguf".to_string(),
                url: "https://huggingface.co/lmstudio-ai/gemma-2b-it-GGUF/resolve/main/gemma-2b-it-q4_k_m.gguf".to_string(),
                expected_size: 1_500_000_000,
                sha256: None,
            }],
        }
    }

    /// MiniCPM-V 4.0 (vision, language model + projector)
    ///
    /// The projector is listed first so it downloads before the larger
    /// language model.
    pub fn vision_model() -> Self {
        Self {
            family: "vision".to_string(),
            display_name: "MiniCPM-V 4.0".to_string(),
            files: vec![
                ArtifactFile {
                    role: FileRole::VisionProjector,
                    file_name: "mmproj-model-f16.gguf".to_string(),
                    url: "https://huggingface.co/openbmb/MiniCPM-V-4-gguf/resolve/main/mmproj-model-f16.gguf?download=true".to_string(),
                    expected_size: 959_000_000,
                    sha256: None,
                },
                ArtifactFile {
                    role: FileRole::LanguageModel,
                    file_name: "ggml-model-Q4_0.gguf".to_string(),
                    url: "https://huggingface.co/openbmb/MiniCPM-V-4-gguf/resolve/main/ggml-model-Q4_0.gguf?download=true".to_string(),
                    expected_size: 2_080_000_000,
                    sha256: None,
                },
            ],
        }
    }

    /// Apply download URL overrides from the `[models]` config section
    pub fn with_overrides(mut self, overrides: &ModelsConfig) -> Self {
        let composite = self.is_composite();
        for file in &mut self.files {
            let url = match (file.role, composite) {
                (FileRole::LanguageModel, false) => &overrides.text_model_url,
                (FileRole::LanguageModel, true) => &overrides.vision_model_url,
                (FileRole::VisionProjector, _) => &overrides.vision_projector_url,
            };
            if let Some(url) = url {
                file.url = url.clone();
            }
        }
        self
    }

    pub fn file(&self, role: FileRole) -> Option<&ArtifactFile> {
        self.files.iter().find(|f| f.role == role)
    }

    /// More than one required file
    pub fn is_composite(&self) -> bool {
        self.files.len() > 1
    }

    /// Sum of expected sizes of all required files
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.expected_size).sum()
    }

    /// Decide which required file an imported file replaces
    ///
    /// `mmproj` names are projectors. `ggml-model`, `Q4` or `Q8` names are
    /// language models; single-file families also accept any `.gguf`.
    pub fn classify_import(&self, file_name: &str) -> Option<FileRole> {
        let role = if file_name.contains("mmproj") {
            FileRole::VisionProjector
        } else if file_name.contains("ggml-model")
            || file_name.contains("Q4")
            || file_name.contains("Q8")
            || (!self.is_composite() && file_name.to_ascii_lowercase().ends_with(".gguf"))
        {
            FileRole::LanguageModel
        } else {
            return None;
        };

        self.file(role).map(|f| f.role)
    }
}
