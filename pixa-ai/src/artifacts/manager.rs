//! Model artifact lifecycle manager
//!
//! Owns one model family directory (`<root>/models/<family>/`). "Downloaded"
//! is always recomputed from the files on disk; the manager only remembers
//! transient state (in-flight transfer, last failure, cancellation).

use super::catalog::{ArtifactFile, ArtifactSpec, FileRole};
use super::download::{
    finalize_part, part_path, plan_segments, remove_if_exists, transfer_file, verify_transfer,
    TransferOutcome,
};
use crate::error::{InferenceError, InferenceResult};
use pixa_common::events::{EventBus, PixaEvent};
use pixa_common::human_size::format_human_size;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Free space kept in reserve on top of the download size
pub const STORAGE_MARGIN_BYTES: u64 = 500_000_000;

/// Minimum overall progress step between progress events
const PROGRESS_EVENT_STEP: f64 = 0.01;

/// Lifecycle state of a model family
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum DownloadState {
    NotDownloaded,
    Downloading,
    Downloaded,
    Failed(String),
    Cancelled,
}

/// Snapshot published on the progress channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadStatus {
    pub state: DownloadState,
    /// Overall progress in [0, 1]
    pub progress: f64,
    /// File currently transferring
    pub current_file: Option<String>,
    /// Expected size of all required files
    pub total_bytes: u64,
    /// Bytes of required files present on disk
    pub bytes_on_disk: u64,
}

/// Result of importing a model file from a local path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub role: FileRole,
    /// Canonical name the file was stored under
    pub file_name: String,
    /// Whether the family is complete after this import
    pub is_complete: bool,
}

/// Per-file verification result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCheck {
    pub role: FileRole,
    pub file_name: String,
    pub present: bool,
    pub size: Option<u64>,
    pub expected_size: u64,
    /// Present and at least the minimum plausible size
    pub plausible: bool,
}

/// Verification report for a model family
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub family: String,
    pub files: Vec<FileCheck>,
    pub is_complete: bool,
}

impl VerificationReport {
    /// Every file present and plausibly sized
    pub fn is_healthy(&self) -> bool {
        self.files.iter().all(|f| f.plausible)
    }

    /// Files that are present but too small
    pub fn suspicious_files(&self) -> impl Iterator<Item = &FileCheck> {
        self.files.iter().filter(|f| f.present && !f.plausible)
    }
}

/// Awaitable outcome of a `start_download` call
///
/// Resolves when the family leaves the downloading state. A handle returned
/// from a no-op start observes the download already in flight.
pub struct DownloadHandle {
    started: bool,
    manager: ModelArtifactManager,
    status_rx: watch::Receiver<DownloadStatus>,
}

impl DownloadHandle {
    /// Whether this call started a new transfer
    pub fn started(&self) -> bool {
        self.started
    }

    /// Wait for the download to finish
    pub async fn wait(mut self) -> InferenceResult<()> {
        loop {
            let state = self.status_rx.borrow_and_update().state.clone();
            if state != DownloadState::Downloading {
                if self.manager.is_complete() {
                    return Ok(());
                }
                return Err(match state {
                    DownloadState::Failed(reason) => InferenceError::DownloadFailed(reason),
                    DownloadState::Cancelled => {
                        InferenceError::DownloadFailed("download cancelled".to_string())
                    }
                    _ => InferenceError::DownloadFailed("model files incomplete".to_string()),
                });
            }

            if self.status_rx.changed().await.is_err() {
                return Err(InferenceError::DownloadFailed(
                    "download manager shut down".to_string(),
                ));
            }
        }
    }
}

struct ActiveJob {
    id: Uuid,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    /// Set once a cancel has taken over; the slot stays occupied until it drains
    cancelling: bool,
}

struct ManagerInner {
    spec: ArtifactSpec,
    directory: PathBuf,
    http_client: reqwest::Client,
    event_bus: EventBus,
    status_tx: watch::Sender<DownloadStatus>,
    job: Mutex<Option<ActiveJob>>,
}

/// Lifecycle manager for one local model family
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ModelArtifactManager {
    inner: Arc<ManagerInner>,
}

impl ModelArtifactManager {
    /// Create a manager for `spec` stored under `models_root/<family>/`
    pub fn new(
        spec: ArtifactSpec,
        models_root: &Path,
        http_client: reqwest::Client,
        event_bus: EventBus,
    ) -> Self {
        let directory = models_root.join(&spec.family);
        let initial = DownloadStatus {
            state: DownloadState::NotDownloaded,
            progress: 0.0,
            current_file: None,
            total_bytes: spec.total_size(),
            bytes_on_disk: 0,
        };
        let (status_tx, _) = watch::channel(initial);

        let manager = Self {
            inner: Arc::new(ManagerInner {
                spec,
                directory,
                http_client,
                event_bus,
                status_tx,
                job: Mutex::new(None),
            }),
        };
        manager.publish(|_| {});
        manager
    }

    pub fn spec(&self) -> &ArtifactSpec {
        &self.inner.spec
    }

    pub fn family(&self) -> &str {
        &self.inner.spec.family
    }

    /// Managed directory for this family
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    /// Canonical on-disk path of a required file
    pub fn file_path(&self, role: FileRole) -> Option<PathBuf> {
        self.inner
            .spec
            .file(role)
            .map(|f| self.inner.directory.join(&f.file_name))
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Every required file exists (checked on disk each call)
    pub fn is_complete(&self) -> bool {
        self.inner
            .spec
            .files
            .iter()
            .all(|f| self.inner.directory.join(&f.file_name).is_file())
    }

    pub fn is_downloading(&self) -> bool {
        self.lock_job().is_some()
    }

    /// Current status, with "downloaded" recomputed from disk
    pub fn status(&self) -> DownloadStatus {
        let mut status = self.inner.status_tx.borrow().clone();
        self.reconcile(&mut status);
        status
    }

    /// Receive status updates (progress, state changes)
    pub fn subscribe_progress(&self) -> watch::Receiver<DownloadStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Expected bytes of required files not yet on disk
    pub fn remaining_bytes(&self) -> u64 {
        self.missing_files().iter().map(|f| f.expected_size).sum()
    }

    /// Bytes of required files currently on disk
    pub fn bytes_on_disk(&self) -> u64 {
        self.inner
            .spec
            .files
            .iter()
            .filter_map(|f| std::fs::metadata(self.inner.directory.join(&f.file_name)).ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum()
    }

    /// Free space on the model volume covers the remaining download plus margin
    ///
    /// Returns false when free space cannot be determined.
    pub fn has_enough_storage(&self) -> bool {
        let required = self.remaining_bytes().saturating_add(STORAGE_MARGIN_BYTES);
        let probe = nearest_existing_ancestor(&self.inner.directory);

        match fs2::available_space(&probe) {
            Ok(available) => {
                debug!(
                    family = %self.family(),
                    available,
                    required,
                    "Storage check"
                );
                available >= required
            }
            Err(e) => {
                warn!(
                    family = %self.family(),
                    path = %probe.display(),
                    error = %e,
                    "Could not determine free space"
                );
                false
            }
        }
    }

    /// Total download size, e.g. "3.04 GB"
    pub fn display_total_size(&self) -> String {
        format_human_size(self.inner.spec.total_size())
    }

    /// Size of the files already on disk
    pub fn display_size_on_disk(&self) -> String {
        format_human_size(self.bytes_on_disk())
    }

    /// Storage requirement shown before a download
    pub fn storage_requirement_text(&self) -> String {
        format!(
            "Requires {} of free space ({} download plus {} reserve)",
            format_human_size(self.remaining_bytes().saturating_add(STORAGE_MARGIN_BYTES)),
            format_human_size(self.remaining_bytes()),
            format_human_size(STORAGE_MARGIN_BYTES)
        )
    }

    // ------------------------------------------------------------------------
    // Download lifecycle
    // ------------------------------------------------------------------------

    /// Start downloading the missing files on a background task
    ///
    /// No-op (handle with `started() == false`) when a download is already
    /// running or every file is present. Fails with `InsufficientStorage`
    /// before any transfer when the volume is too full.
    pub async fn start_download(&self) -> InferenceResult<DownloadHandle> {
        let mut job = self.lock_job();

        if job.is_some() || self.is_complete() {
            debug!(family = %self.family(), "Download already running or complete");
            return Ok(self.handle(false));
        }

        if !self.has_enough_storage() {
            warn!(family = %self.family(), "Not enough free space for model download");
            return Err(InferenceError::InsufficientStorage);
        }

        std::fs::create_dir_all(&self.inner.directory)?;

        let missing = self.missing_files();
        let expected_bytes: u64 = missing.iter().map(|f| f.expected_size).sum();
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        self.publish(|s| {
            s.state = DownloadState::Downloading;
            s.progress = 0.0;
            s.current_file = missing.first().map(|f| f.file_name.clone());
        });

        info!(
            family = %self.family(),
            files = missing.len(),
            size = %format_human_size(expected_bytes),
            "Starting model download"
        );
        self.inner.event_bus.emit_lossy(PixaEvent::ModelDownloadStarted {
            family: self.family().to_string(),
            expected_bytes,
            timestamp: chrono::Utc::now(),
        });

        let manager = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = manager.run_download(missing, &token).await;
            manager.finish_job(id, outcome);
        });

        *job = Some(ActiveJob {
            id,
            cancel,
            task: Some(task),
            cancelling: false,
        });
        drop(job);

        Ok(self.handle(true))
    }

    /// Cancel the in-flight download, removing partial data
    ///
    /// The job slot stays occupied until the transfer task has stopped and
    /// its partial files are gone, so a concurrent `start_download` is a
    /// no-op rather than a second writer. Returns false when nothing was
    /// downloading.
    pub async fn cancel_download(&self) -> bool {
        let claimed = {
            let mut job = self.lock_job();
            match job.as_mut() {
                None => return false,
                Some(active) if active.cancelling => None,
                Some(active) => {
                    active.cancelling = true;
                    active.cancel.cancel();
                    Some((active.id, active.task.take()))
                }
            }
        };
        let Some((id, task)) = claimed else {
            // Another cancel is draining the same job
            self.wait_until_idle().await;
            return true;
        };

        // Drain on its own task so a dropped caller cannot strand the slot
        let manager = self.clone();
        let drain = tokio::spawn(async move { manager.drain_cancelled(id, task).await });
        if let Err(e) = drain.await {
            warn!(family = %self.family(), error = %e, "Cancel drain join error");
        }
        true
    }

    /// Stop the cancelled transfer, clean up and release the job slot
    async fn drain_cancelled(&self, id: Uuid, task: Option<JoinHandle<()>>) {
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(family = %self.family(), error = %e, "Download task join error");
            }
        }
        self.remove_part_files().await;

        {
            let mut job = self.lock_job();
            if job.as_ref().map(|j| j.id) == Some(id) {
                *job = None;
            }
            self.publish(|s| {
                s.state = DownloadState::Cancelled;
                s.progress = 0.0;
                s.current_file = None;
            });
        }

        info!(family = %self.family(), "Model download cancelled");
        self.inner.event_bus.emit_lossy(PixaEvent::ModelDownloadCancelled {
            family: self.family().to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Copy a local file into the managed directory under its canonical name
    pub async fn import_model(&self, from: &Path) -> InferenceResult<ImportOutcome> {
        let source_name = from
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                pixa_common::Error::InvalidInput(format!("Not a file path: {}", from.display()))
            })?;

        let unrecognized = || pixa_common::Error::UnrecognizedModelFile {
            family: self.family().to_string(),
            file_name: source_name.to_string(),
        };
        let role = self
            .inner
            .spec
            .classify_import(source_name)
            .ok_or_else(unrecognized)?;
        let file = self.inner.spec.file(role).ok_or_else(unrecognized)?;

        if !from.is_file() {
            return Err(pixa_common::Error::FileNotFound(from.to_path_buf()).into());
        }

        tokio::fs::create_dir_all(&self.inner.directory).await?;
        let destination = self.inner.directory.join(&file.file_name);
        remove_if_exists(&destination).await;
        let copied = tokio::fs::copy(from, &destination).await?;

        if copied < file.min_plausible_size() {
            warn!(
                family = %self.family(),
                file = %file.file_name,
                size = copied,
                "Imported file is much smaller than expected"
            );
        }

        let is_complete = self.is_complete();
        info!(
            family = %self.family(),
            role = %role,
            file = %file.file_name,
            is_complete,
            "Model file imported"
        );

        self.publish(|_| {});
        self.inner.event_bus.emit_lossy(PixaEvent::ModelImported {
            family: self.family().to_string(),
            file_name: file.file_name.clone(),
            complete: is_complete,
            timestamp: chrono::Utc::now(),
        });

        Ok(ImportOutcome {
            role,
            file_name: file.file_name.clone(),
            is_complete,
        })
    }

    /// Remove every file of this family (idempotent)
    ///
    /// An in-flight download is cancelled first.
    pub async fn delete_model(&self) -> InferenceResult<()> {
        self.cancel_download().await;

        for file in &self.inner.spec.files {
            let path = self.inner.directory.join(&file.file_name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(file = %path.display(), "Removed model file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.remove_part_files().await;

        self.publish(|s| {
            s.state = DownloadState::NotDownloaded;
            s.progress = 0.0;
            s.current_file = None;
        });

        info!(family = %self.family(), "Model files deleted");
        self.inner.event_bus.emit_lossy(PixaEvent::ModelDeleted {
            family: self.family().to_string(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Recompute presence and sizes of every required file
    pub fn verify(&self) -> VerificationReport {
        let files = self
            .inner
            .spec
            .files
            .iter()
            .map(|file| {
                let size = std::fs::metadata(self.inner.directory.join(&file.file_name))
                    .ok()
                    .filter(|m| m.is_file())
                    .map(|m| m.len());
                FileCheck {
                    role: file.role,
                    file_name: file.file_name.clone(),
                    present: size.is_some(),
                    size,
                    expected_size: file.expected_size,
                    plausible: size.is_some_and(|s| s >= file.min_plausible_size()),
                }
            })
            .collect::<Vec<_>>();

        let report = VerificationReport {
            family: self.family().to_string(),
            is_complete: files.iter().all(|f| f.present),
            files,
        };

        for check in report.suspicious_files() {
            warn!(
                family = %report.family,
                file = %check.file_name,
                size = ?check.size,
                expected = check.expected_size,
                "Model file is smaller than plausible"
            );
        }
        report
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn run_download(
        &self,
        missing: Vec<ArtifactFile>,
        cancel: &CancellationToken,
    ) -> InferenceResult<TransferOutcome> {
        let sizes: Vec<u64> = missing.iter().map(|f| f.expected_size).collect();
        let segments = plan_segments(&sizes);
        let mut last_event_progress = 0.0;
        let mut last = None;

        for (file, segment) in missing.iter().zip(segments) {
            let destination = self.inner.directory.join(&file.file_name);
            let part = part_path(&destination);

            self.publish(|s| s.current_file = Some(file.file_name.clone()));
            info!(family = %self.family(), file = %file.file_name, "Downloading model file");

            let outcome = transfer_file(&self.inner.http_client, file, &part, cancel, |p| {
                let overall = segment.map(p);
                self.publish(|s| s.progress = s.progress.max(overall));
                if overall - last_event_progress >= PROGRESS_EVENT_STEP {
                    last_event_progress = overall;
                    self.inner.event_bus.emit_lossy(PixaEvent::ModelDownloadProgress {
                        family: self.family().to_string(),
                        current_file: file.file_name.clone(),
                        progress: overall,
                        timestamp: chrono::Utc::now(),
                    });
                }
            })
            .await?;

            let transfer = match outcome {
                TransferOutcome::Cancelled => return Ok(TransferOutcome::Cancelled),
                TransferOutcome::Completed(transfer) => transfer,
            };

            if let Err(e) = verify_transfer(file, &transfer) {
                remove_if_exists(&part).await;
                return Err(e);
            }
            finalize_part(&part, &destination).await?;

            debug!(
                file = %file.file_name,
                bytes = transfer.bytes_written,
                sha256 = %transfer.sha256,
                "Model file in place"
            );
            last = Some(transfer);
        }

        match last {
            Some(transfer) => Ok(TransferOutcome::Completed(transfer)),
            None => Err(InferenceError::DownloadFailed("nothing to download".to_string())),
        }
    }

    /// Publish the final state unless a cancel has taken over the job
    fn finish_job(&self, id: Uuid, outcome: InferenceResult<TransferOutcome>) {
        let mut job = self.lock_job();
        match job.as_ref() {
            Some(active) if active.id == id && !active.cancelling => {}
            // cancel_download owns the final state
            _ => return,
        }
        *job = None;

        match outcome {
            Ok(TransferOutcome::Completed(_)) if self.is_complete() => {
                info!(family = %self.family(), "Model download complete");
                self.publish(|s| {
                    s.state = DownloadState::Downloaded;
                    s.progress = 1.0;
                    s.current_file = None;
                });
                self.inner.event_bus.emit_lossy(PixaEvent::ModelDownloadCompleted {
                    family: self.family().to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
            Ok(TransferOutcome::Cancelled) => {
                self.publish(|s| {
                    s.state = DownloadState::Cancelled;
                    s.progress = 0.0;
                    s.current_file = None;
                });
            }
            Ok(TransferOutcome::Completed(_)) => {
                self.fail("model files incomplete after download".to_string());
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn fail(&self, reason: String) {
        error!(family = %self.family(), reason = %reason, "Model download failed");
        self.publish(|s| {
            s.state = DownloadState::Failed(reason.clone());
            s.progress = 0.0;
            s.current_file = None;
        });
        self.inner.event_bus.emit_lossy(PixaEvent::ModelDownloadFailed {
            family: self.family().to_string(),
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Apply `update`, refresh disk-derived fields and notify subscribers
    fn publish(&self, update: impl FnOnce(&mut DownloadStatus)) {
        self.inner.status_tx.send_modify(|status| {
            update(status);
            self.reconcile(status);
        });
    }

    fn reconcile(&self, status: &mut DownloadStatus) {
        status.total_bytes = self.inner.spec.total_size();
        if status.state == DownloadState::Downloading {
            return;
        }

        status.bytes_on_disk = self.bytes_on_disk();
        if self.is_complete() {
            status.state = DownloadState::Downloaded;
            status.progress = 1.0;
        } else if status.state == DownloadState::Downloaded {
            status.state = DownloadState::NotDownloaded;
            status.progress = 0.0;
        }
    }

    fn missing_files(&self) -> Vec<ArtifactFile> {
        self.inner
            .spec
            .files
            .iter()
            .filter(|f| !self.inner.directory.join(&f.file_name).is_file())
            .cloned()
            .collect()
    }

    /// Wait for the job slot to be released by whoever holds it
    async fn wait_until_idle(&self) {
        let mut rx = self.inner.status_tx.subscribe();
        while self.is_downloading() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn remove_part_files(&self) {
        for file in &self.inner.spec.files {
            remove_if_exists(&part_path(&self.inner.directory.join(&file.file_name))).await;
        }
    }

    fn handle(&self, started: bool) -> DownloadHandle {
        DownloadHandle {
            started,
            manager: self.clone(),
            status_rx: self.inner.status_tx.subscribe(),
        }
    }

    fn lock_job(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        // Poisoning only follows a panic inside a short critical section
        self.inner
            .job
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Closest ancestor of `path` that exists (for free-space queries)
fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
