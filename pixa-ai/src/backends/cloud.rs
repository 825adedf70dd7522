//! Cloud messages API backend
//!
//! Sends recognized text or the photo itself (base64) to a hosted model and
//! parses the first text block of the answer. Photos are downscaled to fit
//! 1024 px and re-encoded as JPEG before upload. Available whenever an API
//! key is configured; requests are rate limited client-side.

use super::prompts::{text_prompt, IMAGE_PROMPT, SYSTEM_PROMPT};
use super::response_parser::parse_model_response;
use crate::error::{InferenceError, InferenceResult};
use crate::types::{BackendKind, ExtractedResult, InferenceBackend};
use async_trait::async_trait;
use base64::Engine as _;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest edge of an uploaded photo
const MAX_UPLOAD_DIMENSION: u32 = 1024;
const UPLOAD_JPEG_QUALITY: u8 = 85;

/// Media types the messages API accepts for images
const SUPPORTED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Cloud backend settings
#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Hosted model backend (text and image)
pub struct CloudBackend {
    client: reqwest::Client,
    settings: CloudSettings,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl CloudBackend {
    pub fn new(settings: CloudSettings) -> InferenceResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pixa-ai/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ExtractionFailed(format!("HTTP client: {}", e)))?;

        let per_minute = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        Ok(Self {
            client,
            settings,
            rate_limiter,
        })
    }

    fn api_key(&self) -> Option<&str> {
        self.settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    async fn send(&self, content: Vec<ContentBlock>) -> InferenceResult<String> {
        let api_key = self
            .api_key()
            .ok_or_else(|| InferenceError::ExtractionFailed("API key not set".to_string()))?;

        self.rate_limiter.until_ready().await;

        let request = MessagesRequest {
            model: &self.settings.model,
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content,
            }],
        };

        debug!(model = %self.settings.model, "Sending cloud inference request");

        let response = self
            .client
            .post(&self.settings.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::ExtractionFailed(format!("request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED => {
                return Err(InferenceError::ExtractionFailed("invalid API key".to_string()))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(InferenceError::ExtractionFailed("rate limited".to_string()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body.chars().take(200).collect::<String>(), "Cloud API error");
                return Err(InferenceError::ExtractionFailed(format!(
                    "API error: {}",
                    status.as_u16()
                )));
            }
        }

        let body: MessagesResponse = response.json().await.map_err(|e| {
            debug!(error = %e, "Cloud response is not a messages payload");
            InferenceError::InvalidResponse
        })?;

        first_text_block(body).ok_or(InferenceError::InvalidResponse)
    }
}

fn first_text_block(response: MessagesResponse) -> Option<String> {
    response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
}

/// Media type for an encoded image, defaulting to JPEG when unrecognized
fn image_media_type(image: &[u8]) -> InferenceResult<&'static str> {
    match infer::get(image).map(|kind| kind.mime_type()) {
        Some(mime) if SUPPORTED_IMAGE_TYPES.contains(&mime) => Ok(mime),
        Some(mime) if mime.starts_with("image/") => Err(InferenceError::ExtractionFailed(
            format!("unsupported image type: {}", mime),
        )),
        _ => Ok("image/jpeg"),
    }
}

/// Photo bytes ready for upload
#[derive(Debug)]
struct UploadImage {
    media_type: &'static str,
    data: Vec<u8>,
}

/// Downscale to fit the upload bound and re-encode as JPEG
///
/// Bytes the decoder does not understand are sent unchanged when their
/// media type is accepted by the API.
fn prepare_upload(photo: &[u8]) -> InferenceResult<UploadImage> {
    let decoded = match image::load_from_memory(photo) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(error = %e, "Photo not decodable, uploading as is");
            return Ok(UploadImage {
                media_type: image_media_type(photo)?,
                data: photo.to_vec(),
            });
        }
    };

    let (width, height) = decoded.dimensions();
    let resized = if width > MAX_UPLOAD_DIMENSION || height > MAX_UPLOAD_DIMENSION {
        decoded.thumbnail(MAX_UPLOAD_DIMENSION, MAX_UPLOAD_DIMENSION)
    } else {
        decoded
    };
    // JPEG has no alpha channel
    let rgb = resized.into_rgb8();

    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, UPLOAD_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| InferenceError::ExtractionFailed(format!("image encoding failed: {}", e)))?;

    debug!(
        original = %format!("{}x{}", width, height),
        uploaded = %format!("{}x{}", rgb.width(), rgb.height()),
        bytes = data.len(),
        "Prepared photo for upload"
    );
    Ok(UploadImage {
        media_type: "image/jpeg",
        data,
    })
}

#[async_trait]
impl InferenceBackend for CloudBackend {
    fn name(&self) -> &'static str {
        "Cloud API"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn supports_text(&self) -> bool {
        true
    }

    fn supports_image(&self) -> bool {
        true
    }

    async fn is_available(&self) -> bool {
        self.api_key().is_some()
    }

    async fn extract_from_text(&self, text: &str) -> InferenceResult<ExtractedResult> {
        let answer = self
            .send(vec![ContentBlock::Text {
                text: text_prompt(text),
            }])
            .await?;
        Ok(parse_model_response(&answer))
    }

    async fn extract_from_image(&self, image: &[u8]) -> InferenceResult<ExtractedResult> {
        let upload = prepare_upload(image)?;
        let data = base64::engine::general_purpose::STANDARD.encode(&upload.data);

        let answer = self
            .send(vec![
                ContentBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type: upload.media_type.to_string(),
                        data,
                    },
                },
                ContentBlock::Text {
                    text: IMAGE_PROMPT.to_string(),
                },
            ])
            .await?;
        Ok(parse_model_response(&answer))
    }
}
