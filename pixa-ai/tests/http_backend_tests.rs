//! Cloud and on-device backends against an in-process mock service
//!
//! Covers:
//! - Request shape (headers, model, system prompt, image content)
//! - Photos downscaled and re-encoded before upload
//! - Status code mapping to extraction errors
//! - Response parsing through the shared parser
//! - On-device availability probe and plain-text answers

mod helpers;

use helpers::InferenceServer;
use pixa_ai::backends::{CloudBackend, CloudSettings, OnDeviceBackend, OnDeviceSettings};
use pixa_ai::orchestrator::FallbackOrchestrator;
use pixa_ai::{EnginePreference, InferenceBackend, InferenceError};
use base64::Engine as _;
use image::GenericImageView;
use std::sync::Arc;

/// Minimal PNG signature plus IHDR chunk start
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01";

fn cloud(server: &InferenceServer, key: &str) -> CloudBackend {
    CloudBackend::new(CloudSettings {
        api_url: server.messages_url(),
        model: "test-model".to_string(),
        api_key: Some(key.to_string()),
        requests_per_minute: 600,
    })
    .unwrap()
}

fn on_device(endpoint: &str, enabled: bool) -> OnDeviceBackend {
    OnDeviceBackend::new(OnDeviceSettings {
        enabled,
        endpoint: endpoint.to_string(),
        model: "gemma3:4b".to_string(),
    })
    .unwrap()
}

#[tokio::test]
async fn test_cloud_text_request_and_parse() {
    let server = InferenceServer::start().await;
    let backend = cloud(&server, "sk-good");

    let result = backend
        .extract_from_text("港の朝市 鮮魚 直売")
        .await
        .unwrap();

    assert_eq!(result.tags(), &["Sea", "boat", "harbor"]);
    assert_eq!(result.description(), Some("漁港の朝"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.api_key.as_deref(), Some("sk-good"));
    assert_eq!(request.api_version.as_deref(), Some("2023-06-01"));
    assert_eq!(request.body["model"], "test-model");
    assert!(request.body["max_tokens"].as_u64().unwrap() > 0);
    assert!(!request.body["system"].as_str().unwrap().is_empty());
    let text = request.body["messages"][0]["content"][0]["text"]
        .as_str()
        .unwrap();
    assert!(text.contains("港の朝市 鮮魚 直売"));
}

#[tokio::test]
async fn test_cloud_image_request_carries_media_type() {
    let server = InferenceServer::start().await;
    let backend = cloud(&server, "sk-good");

    backend.extract_from_image(PNG).await.unwrap();

    let requests = server.requests();
    let content = &requests[0].body["messages"][0]["content"];
    assert_eq!(content[0]["type"], "image");
    assert_eq!(content[0]["source"]["type"], "base64");
    assert_eq!(content[0]["source"]["media_type"], "image/png");
    assert!(!content[0]["source"]["data"].as_str().unwrap().is_empty());
    assert_eq!(content[1]["type"], "text");
}

#[tokio::test]
async fn test_cloud_uploads_downscaled_jpeg() {
    let server = InferenceServer::start().await;
    let backend = cloud(&server, "sk-good");

    let photo = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        2048,
        1536,
        image::Rgb([30, 90, 160]),
    ));
    let mut png = Vec::new();
    photo
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    backend.extract_from_image(&png).await.unwrap();

    let requests = server.requests();
    let source = &requests[0].body["messages"][0]["content"][0]["source"];
    assert_eq!(source["media_type"], "image/jpeg");
    let sent = base64::engine::general_purpose::STANDARD
        .decode(source["data"].as_str().unwrap())
        .unwrap();
    let sent = image::load_from_memory(&sent).unwrap();
    assert_eq!(sent.dimensions(), (1024, 768));
}

#[tokio::test]
async fn test_cloud_status_mapping() {
    let server = InferenceServer::start().await;

    for (key, expected) in [
        ("sk-revoked", "invalid API key"),
        ("sk-busy", "rate limited"),
        ("sk-other", "API error: 500"),
    ] {
        let err = cloud(&server, key)
            .extract_from_text("テキスト")
            .await
            .unwrap_err();
        match err {
            InferenceError::ExtractionFailed(reason) => assert_eq!(reason, expected, "key {}", key),
            other => panic!("key {}: unexpected error {:?}", key, other),
        }
    }

    let err = cloud(&server, "sk-empty")
        .extract_from_text("テキスト")
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::InvalidResponse));
}

#[tokio::test]
async fn test_cloud_only_preference_surfaces_failure() {
    let server = InferenceServer::start().await;
    let orchestrator = FallbackOrchestrator::new(vec![
        Arc::new(cloud(&server, "sk-revoked")) as Arc<dyn InferenceBackend>
    ]);

    let err = orchestrator
        .extract_from_text(EnginePreference::CloudOnly, "メニュー 本日のおすすめ")
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::ExtractionFailed(ref r) if r == "invalid API key"));

    let err = orchestrator
        .extract_from_text(EnginePreference::Auto, "メニュー 本日のおすすめ")
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::NotAvailable));
}

#[tokio::test]
async fn test_on_device_probe_and_plain_text_answer() {
    let server = InferenceServer::start().await;
    let backend = on_device(&format!("{}/", server.base_url()), true);

    assert!(backend.is_available().await);
    let result = backend.extract_from_text("夕方の港").await.unwrap();

    assert_eq!(result.tags(), &["夕焼け", "海", "港"]);
    assert!((result.confidence() - 0.3).abs() < 1e-6);

    let requests = server.requests();
    let generate = requests
        .iter()
        .find(|r| r.path == "/api/generate")
        .unwrap();
    assert_eq!(generate.body["model"], "gemma3:4b");
    assert_eq!(generate.body["stream"], false);
    assert!(generate.body["prompt"].as_str().unwrap().contains("夕方の港"));
}

#[tokio::test]
async fn test_on_device_disabled_or_unreachable() {
    let server = InferenceServer::start().await;
    assert!(!on_device(server.base_url(), false).is_available().await);
    assert!(!on_device("http://127.0.0.1:9", true).is_available().await);

    let backend = on_device(server.base_url(), true);
    assert!(!backend.supports_image());
    assert!(matches!(
        backend.extract_from_image(b"jpeg").await,
        Err(InferenceError::NotAvailable)
    ));
}
