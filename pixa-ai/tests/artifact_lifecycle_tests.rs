//! Model artifact lifecycle against a local HTTP fixture server
//!
//! Covers:
//! - Composite download with monotone progress and final rename
//! - Second start while downloading is a no-op
//! - Cancellation resets progress and removes partial files
//! - Starts arriving while a cancel drains do not spawn a second writer
//! - HTTP errors, checksum mismatches and storage refusal
//! - Redirects, restart after cancel, deletion

mod helpers;

use helpers::{fixture_bytes, FixtureServer};
use pixa_ai::artifacts::{
    ArtifactFile, ArtifactSpec, DownloadState, FileRole, ModelArtifactManager,
};
use pixa_ai::InferenceError;
use pixa_common::events::{EventBus, PixaEvent};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

const PROJECTOR: &str = "mmproj-test.gguf";
const PROJECTOR_LEN: usize = 24 * 1024;
const MODEL: &str = "ggml-model-test.gguf";
const MODEL_LEN: usize = 40 * 1024;

const WAIT_LIMIT: Duration = Duration::from_secs(20);

async fn start_server() -> FixtureServer {
    FixtureServer::start(vec![
        (PROJECTOR, fixture_bytes(PROJECTOR_LEN, 1)),
        (MODEL, fixture_bytes(MODEL_LEN, 2)),
    ])
    .await
}

fn artifact(
    server: &FixtureServer,
    route: &str,
    role: FileRole,
    name: &str,
    len: usize,
) -> ArtifactFile {
    ArtifactFile {
        role,
        file_name: name.to_string(),
        url: server.url(&format!("/{}/{}", route, name)),
        expected_size: len as u64,
        sha256: None,
    }
}

fn vision_spec(server: &FixtureServer, route: &str) -> ArtifactSpec {
    ArtifactSpec {
        family: "vision".to_string(),
        display_name: "Fixture vision model".to_string(),
        files: vec![
            artifact(server, route, FileRole::VisionProjector, PROJECTOR, PROJECTOR_LEN),
            artifact(server, route, FileRole::LanguageModel, MODEL, MODEL_LEN),
        ],
    }
}

fn text_spec(file: ArtifactFile) -> ArtifactSpec {
    ArtifactSpec {
        family: "text".to_string(),
        display_name: "Fixture text model".to_string(),
        files: vec![file],
    }
}

fn manager(spec: ArtifactSpec, root: &Path, bus: &EventBus) -> ModelArtifactManager {
    ModelArtifactManager::new(spec, root, reqwest::Client::new(), bus.clone())
}

fn part_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.ends_with(".part"))
                .collect()
        })
        .unwrap_or_default()
}

fn drain(events: &mut broadcast::Receiver<PixaEvent>) -> Vec<PixaEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Wait until the transfer has made visible progress
async fn wait_for_progress(manager: &ModelArtifactManager) {
    let mut rx = manager.subscribe_progress();
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            {
                let status = rx.borrow_and_update();
                if status.state == DownloadState::Downloading && status.progress > 0.0 {
                    return;
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("download never made progress");
}

#[tokio::test]
async fn test_composite_download_progress_is_monotone() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(4096);
    let mut events = bus.subscribe();
    let manager = manager(vision_spec(&server, "files"), tmp.path(), &bus);

    let mut rx = manager.subscribe_progress();
    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            seen.push(status.progress);
            if status.state != DownloadState::Downloading {
                break;
            }
        }
        seen
    });

    let handle = manager.start_download().await.unwrap();
    assert!(handle.started());
    tokio::time::timeout(WAIT_LIMIT, handle.wait())
        .await
        .unwrap()
        .unwrap();

    let seen = tokio::time::timeout(WAIT_LIMIT, collector).await.unwrap().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
    assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(seen.last().copied(), Some(1.0));

    let status = manager.status();
    assert_eq!(status.state, DownloadState::Downloaded);
    assert_eq!(status.progress, 1.0);
    assert_eq!(status.bytes_on_disk, (PROJECTOR_LEN + MODEL_LEN) as u64);
    assert!(manager.is_complete());
    assert!(part_files(manager.directory()).is_empty());
    assert_eq!(
        std::fs::read(manager.directory().join(MODEL)).unwrap(),
        fixture_bytes(MODEL_LEN, 2)
    );

    let events = drain(&mut events);
    assert!(matches!(
        events.first(),
        Some(PixaEvent::ModelDownloadStarted { expected_bytes, .. })
            if *expected_bytes == (PROJECTOR_LEN + MODEL_LEN) as u64
    ));
    assert!(matches!(events.last(), Some(PixaEvent::ModelDownloadCompleted { .. })));

    let progress: Vec<(String, f64)> = events
        .iter()
        .filter_map(|e| match e {
            PixaEvent::ModelDownloadProgress {
                current_file,
                progress,
                ..
            } => Some((current_file.clone(), *progress)),
            _ => None,
        })
        .collect();
    assert!(progress.windows(2).all(|w| w[0].1 <= w[1].1));
    // Projector first, then the language model
    assert_eq!(progress.first().map(|p| p.0.as_str()), Some(PROJECTOR));
    assert_eq!(progress.last().map(|p| p.0.as_str()), Some(MODEL));
}

#[tokio::test]
async fn test_second_start_while_downloading_is_noop() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(4096);
    let mut events = bus.subscribe();
    let manager = manager(vision_spec(&server, "slow"), tmp.path(), &bus);

    let first = manager.start_download().await.unwrap();
    let second = manager.start_download().await.unwrap();

    assert!(first.started());
    assert!(!second.started());
    assert!(manager.is_downloading());

    let started = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, PixaEvent::ModelDownloadStarted { .. }))
        .count();
    assert_eq!(started, 1);

    assert!(manager.cancel_download().await);
    let err = second.wait().await.unwrap_err();
    assert!(matches!(err, InferenceError::DownloadFailed(_)));
}

#[tokio::test]
async fn test_cancel_resets_progress_and_removes_partials() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(4096);
    let mut events = bus.subscribe();
    let manager = manager(vision_spec(&server, "slow"), tmp.path(), &bus);

    let handle = manager.start_download().await.unwrap();
    wait_for_progress(&manager).await;

    assert!(manager.cancel_download().await);

    let status = manager.status();
    assert_eq!(status.state, DownloadState::Cancelled);
    assert_eq!(status.progress, 0.0);
    assert!(status.current_file.is_none());
    assert!(!manager.is_downloading());
    assert!(!manager.is_complete());
    assert!(part_files(manager.directory()).is_empty());
    assert!(!manager.directory().join(PROJECTOR).exists());

    assert!(handle.wait().await.is_err());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, PixaEvent::ModelDownloadCancelled { .. })));

    // Nothing left to cancel
    assert!(!manager.cancel_download().await);
}

#[tokio::test]
async fn test_start_during_cancel_is_noop_until_drained() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(4096);
    let manager = manager(vision_spec(&server, "slow"), tmp.path(), &bus);

    manager.start_download().await.unwrap();
    wait_for_progress(&manager).await;

    let cancel = manager.cancel_download();
    tokio::pin!(cancel);
    // Token fired, task not yet joined
    assert!(futures::poll!(&mut cancel).is_pending());

    let during = manager.start_download().await.unwrap();
    assert!(!during.started());
    assert!(manager.is_downloading());

    assert!(cancel.await);
    let status = manager.status();
    assert_eq!(status.state, DownloadState::Cancelled);
    assert_eq!(status.progress, 0.0);
    assert!(!manager.is_downloading());
    assert!(part_files(manager.directory()).is_empty());
    assert!(during.wait().await.is_err());

    // The slot is free again once the cancel has drained
    let after = manager.start_download().await.unwrap();
    assert!(after.started());
    assert!(manager.cancel_download().await);
}

#[tokio::test]
async fn test_restart_after_cancel_downloads_from_scratch() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(4096);

    let slow = manager(vision_spec(&server, "slow"), tmp.path(), &bus);
    slow.start_download().await.unwrap();
    wait_for_progress(&slow).await;
    slow.cancel_download().await;

    let fast = manager(vision_spec(&server, "files"), tmp.path(), &bus);
    let handle = fast.start_download().await.unwrap();
    assert!(handle.started());
    tokio::time::timeout(WAIT_LIMIT, handle.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        std::fs::read(fast.directory().join(PROJECTOR)).unwrap(),
        fixture_bytes(PROJECTOR_LEN, 1)
    );
    assert!(fast.is_complete());
}

#[tokio::test]
async fn test_http_error_marks_download_failed() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(4096);
    let mut events = bus.subscribe();
    let file = artifact(&server, "files", FileRole::LanguageModel, "absent.gguf", 1024);
    let manager = manager(text_spec(file), tmp.path(), &bus);

    let handle = manager.start_download().await.unwrap();
    let err = tokio::time::timeout(WAIT_LIMIT, handle.wait())
        .await
        .unwrap()
        .unwrap_err();

    match err {
        InferenceError::DownloadFailed(reason) => assert!(reason.contains("404"), "{}", reason),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(matches!(manager.status().state, DownloadState::Failed(_)));
    assert_eq!(manager.status().progress, 0.0);
    assert!(part_files(manager.directory()).is_empty());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, PixaEvent::ModelDownloadFailed { .. })));

    // A failed job does not block the next attempt
    assert!(!manager.is_downloading());
}

#[tokio::test]
async fn test_checksum_is_enforced_when_pinned() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(64);

    let mut wrong = artifact(&server, "files", FileRole::LanguageModel, MODEL, MODEL_LEN);
    wrong.sha256 = Some("00".repeat(32));
    let manager_wrong = manager(text_spec(wrong), tmp.path(), &bus);
    let err = manager_wrong
        .start_download()
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("checksum mismatch"));
    assert!(!manager_wrong.directory().join(MODEL).exists());
    assert!(part_files(manager_wrong.directory()).is_empty());

    let mut pinned = artifact(&server, "files", FileRole::LanguageModel, MODEL, MODEL_LEN);
    pinned.sha256 = Some(hex::encode(Sha256::digest(fixture_bytes(MODEL_LEN, 2))).to_uppercase());
    let manager_pinned = manager(text_spec(pinned), tmp.path(), &bus);
    manager_pinned
        .start_download()
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(manager_pinned.is_complete());
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(64);
    let file = artifact(&server, "redirect", FileRole::LanguageModel, MODEL, MODEL_LEN);
    let manager = manager(text_spec(file), tmp.path(), &bus);

    tokio::time::timeout(WAIT_LIMIT, manager.start_download().await.unwrap().wait())
        .await
        .unwrap()
        .unwrap();
    assert!(manager.is_complete());
}

#[tokio::test]
async fn test_truncated_file_is_rejected() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(64);
    // Catalog claims far more than the server has
    let mut file = artifact(&server, "files", FileRole::LanguageModel, PROJECTOR, PROJECTOR_LEN);
    file.expected_size = (PROJECTOR_LEN * 4) as u64;
    let manager = manager(text_spec(file), tmp.path(), &bus);

    let err = manager
        .start_download()
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("too small"), "{}", err);
    assert!(!manager.is_complete());
}

#[tokio::test]
async fn test_insufficient_storage_refuses_before_transfer() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(64);
    let mut file = artifact(&server, "files", FileRole::LanguageModel, MODEL, MODEL_LEN);
    file.expected_size = u64::MAX / 2;
    let manager = manager(text_spec(file), tmp.path(), &bus);

    assert!(!manager.has_enough_storage());
    let err = manager.start_download().await.err().unwrap();
    assert!(matches!(err, InferenceError::InsufficientStorage));
    assert!(!manager.directory().exists());
    assert_eq!(manager.status().state, DownloadState::NotDownloaded);
}

#[tokio::test]
async fn test_download_then_delete() {
    let server = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bus = EventBus::new(4096);
    let manager = manager(vision_spec(&server, "files"), tmp.path(), &bus);

    manager.start_download().await.unwrap().wait().await.unwrap();
    assert!(manager.is_complete());

    // Already complete: no new transfer
    assert!(!manager.start_download().await.unwrap().started());

    manager.delete_model().await.unwrap();
    manager.delete_model().await.unwrap();
    assert!(!manager.is_complete());
    assert_eq!(manager.status().state, DownloadState::NotDownloaded);
    assert_eq!(manager.bytes_on_disk(), 0);
}
