//! Core Types and Trait Definitions for pixa-ai
//!
//! Defines the uniform backend capability interface every inference engine
//! implements, the extraction result shared by all of them, and the engine
//! preference table the orchestrator resolves against.

use crate::error::{InferenceError, InferenceResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Extraction Result
// ============================================================================

/// Number of tags at which derived confidence saturates
const CONFIDENCE_SATURATION_TAGS: f32 = 5.0;

/// Tags plus optional description produced by one backend call
///
/// Tags form an insertion-ordered set: pushing a tag already present is a
/// no-op. Confidence is derived from the current tag count on every read,
/// never taken from the backend; a result only carries how it is derived
/// (a bonus, or a fixed base for heuristically recovered tags).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedResult {
    tags: Vec<String>,
    description: Option<String>,
    #[serde(default)]
    confidence_bonus: f32,
    #[serde(default)]
    fixed_confidence: Option<f32>,
}

impl ExtractedResult {
    /// Build a result, deduplicating tags
    ///
    /// Empty or whitespace-only tags and descriptions are dropped.
    pub fn new<I, S>(tags: I, description: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = Self {
            description: description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            ..Self::default()
        };
        for tag in tags {
            result.push_tag(tag);
        }
        result
    }

    /// Empty result (no tags, no description)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Tags in first-seen order
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Confidence in [0, 1] for the tags currently held
    pub fn confidence(&self) -> f32 {
        let base = self
            .fixed_confidence
            .unwrap_or_else(|| derived_confidence(self.tags.len()));
        (base + self.confidence_bonus).clamp(0.0, 1.0)
    }

    /// True when at least one tag or a description is present
    pub fn has_valid_data(&self) -> bool {
        !self.tags.is_empty() || self.description.is_some()
    }

    /// Add a bonus on top of the base confidence (result capped at 1.0)
    pub fn with_confidence_bonus(mut self, bonus: f32) -> Self {
        self.confidence_bonus += bonus;
        self
    }

    /// Use a fixed base confidence instead of the tag-count derivation
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.fixed_confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Replace the tag list, keeping description and how confidence is derived
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.clear();
        for tag in tags {
            self.push_tag(tag);
        }
        self
    }

    fn push_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        let tag = tag.trim();
        if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }
}

/// `min(1, n / 5)`, 0 for no tags
fn derived_confidence(tag_count: usize) -> f32 {
    (tag_count as f32 / CONFIDENCE_SATURATION_TAGS).min(1.0)
}

// ============================================================================
// Engine Preference
// ============================================================================

/// Slot a backend occupies in the priority table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Cloud,
    OnDevice,
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Cloud => "cloud",
            BackendKind::OnDevice => "on_device",
            BackendKind::Local => "local",
        };
        write!(f, "{}", s)
    }
}

/// User-selected inference engine preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnginePreference {
    /// Inference disabled
    #[serde(rename = "none")]
    None,
    #[serde(rename = "cloud")]
    CloudOnly,
    #[serde(rename = "on_device")]
    OnDeviceOnly,
    #[serde(rename = "local")]
    LocalOnly,
    /// Cloud, then on-device, then local
    #[default]
    #[serde(rename = "auto")]
    Auto,
}

/// Preference → ordered backend kinds
const PREFERENCE_ORDER: &[(EnginePreference, &[BackendKind])] = &[
    (EnginePreference::None, &[]),
    (EnginePreference::CloudOnly, &[BackendKind::Cloud]),
    (EnginePreference::OnDeviceOnly, &[BackendKind::OnDevice]),
    (EnginePreference::LocalOnly, &[BackendKind::Local]),
    (
        EnginePreference::Auto,
        &[BackendKind::Cloud, BackendKind::OnDevice, BackendKind::Local],
    ),
];

impl EnginePreference {
    /// All preferences, in settings display order
    pub const ALL: [EnginePreference; 5] = [
        EnginePreference::Auto,
        EnginePreference::CloudOnly,
        EnginePreference::OnDeviceOnly,
        EnginePreference::LocalOnly,
        EnginePreference::None,
    ];

    /// Ordered backend kinds this preference tries
    pub fn backend_order(self) -> &'static [BackendKind] {
        PREFERENCE_ORDER
            .iter()
            .find(|(pref, _)| *pref == self)
            .map(|(_, order)| *order)
            .unwrap_or(&[])
    }

    /// True for preferences naming exactly one backend kind
    pub fn is_single_backend(self) -> bool {
        self.backend_order().len() == 1
    }

    /// Persisted string form
    pub fn as_str(self) -> &'static str {
        match self {
            EnginePreference::None => "none",
            EnginePreference::CloudOnly => "cloud",
            EnginePreference::OnDeviceOnly => "on_device",
            EnginePreference::LocalOnly => "local",
            EnginePreference::Auto => "auto",
        }
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            EnginePreference::None => "Disabled",
            EnginePreference::CloudOnly => "Cloud only",
            EnginePreference::OnDeviceOnly => "On-device only",
            EnginePreference::LocalOnly => "Local model only",
            EnginePreference::Auto => "Automatic",
        }
    }
}

impl fmt::Display for EnginePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EnginePreference {
    type Err = pixa_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        EnginePreference::ALL
            .into_iter()
            .find(|pref| pref.as_str() == normalized)
            .ok_or_else(|| {
                pixa_common::Error::InvalidInput(format!("Unknown engine preference: {}", s))
            })
    }
}

// ============================================================================
// Backend Capability Interface
// ============================================================================

/// Kind of input an extraction runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    Text,
    Image,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Text => write!(f, "text"),
            InputKind::Image => write!(f, "image"),
        }
    }
}

/// Borrowed extraction input
#[derive(Debug, Clone, Copy)]
pub enum InferencePayload<'a> {
    Text(&'a str),
    Image(&'a [u8]),
}

impl InferencePayload<'_> {
    pub fn kind(&self) -> InputKind {
        match self {
            InferencePayload::Text(_) => InputKind::Text,
            InferencePayload::Image(_) => InputKind::Image,
        }
    }
}

/// Snapshot of a backend's identity and current availability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub kind: BackendKind,
    pub supports_text: bool,
    pub supports_image: bool,
    pub available: bool,
}

/// Inference backend trait
///
/// Each engine (cloud API, on-device service, local runtime) implements this
/// trait so the orchestrator can sequence them uniformly. Availability is
/// probed on every call and must not have side effects.
///
/// # Example
/// ```rust,ignore
/// use pixa_ai::types::{InferenceBackend, BackendKind, ExtractedResult};
///
/// pub struct KeywordBackend;
///
/// #[async_trait::async_trait]
/// impl InferenceBackend for KeywordBackend {
///     fn name(&self) -> &'static str { "Keywords" }
///     fn kind(&self) -> BackendKind { BackendKind::Local }
///     fn supports_text(&self) -> bool { true }
///     fn supports_image(&self) -> bool { false }
///     async fn is_available(&self) -> bool { true }
///
///     async fn extract_from_text(&self, text: &str) -> InferenceResult<ExtractedResult> {
///         Ok(ExtractedResult::new(text.split_whitespace(), None))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend name for logging and status display
    fn name(&self) -> &'static str;

    /// Priority-table slot
    fn kind(&self) -> BackendKind;

    fn supports_text(&self) -> bool;

    fn supports_image(&self) -> bool;

    /// Whether the backend can run right now
    async fn is_available(&self) -> bool;

    /// Extract tags and description from recognized text
    async fn extract_from_text(&self, text: &str) -> InferenceResult<ExtractedResult>;

    /// Extract tags and description directly from encoded image bytes
    async fn extract_from_image(&self, _image: &[u8]) -> InferenceResult<ExtractedResult> {
        Err(InferenceError::NotAvailable)
    }

    /// Whether this backend accepts the given input kind
    fn supports(&self, input: InputKind) -> bool {
        match input {
            InputKind::Text => self.supports_text(),
            InputKind::Image => self.supports_image(),
        }
    }

    /// Current descriptor (probes availability)
    async fn descriptor(&self) -> BackendDescriptor {
        BackendDescriptor {
            name: self.name().to_string(),
            kind: self.kind(),
            supports_text: self.supports_text(),
            supports_image: self.supports_image(),
            available: self.is_available().await,
        }
    }
}
