//! Streamed single-file transfer and composite progress mapping
//!
//! Each file streams into `<name>.part` next to its destination, hashing as
//! it goes. Only a verified part file is moved into place. Transfers always
//! start from byte zero.

use super::catalog::ArtifactFile;
use crate::error::{InferenceError, InferenceResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Slice `[offset, offset + scale)` of overall progress owned by one file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSegment {
    pub offset: f64,
    pub scale: f64,
}

impl ProgressSegment {
    /// Map per-file progress in [0, 1] onto overall progress
    pub fn map(&self, file_progress: f64) -> f64 {
        (self.offset + self.scale * file_progress.clamp(0.0, 1.0)).clamp(0.0, 1.0)
    }
}

/// Segments proportional to the given sizes, summing to 1
///
/// Zero total size falls back to equal segments.
pub fn plan_segments(sizes: &[u64]) -> Vec<ProgressSegment> {
    if sizes.is_empty() {
        return Vec::new();
    }

    let total: u64 = sizes.iter().sum();
    let mut offset = 0.0;
    sizes
        .iter()
        .map(|&size| {
            let scale = if total == 0 {
                1.0 / sizes.len() as f64
            } else {
                size as f64 / total as f64
            };
            let segment = ProgressSegment { offset, scale };
            offset += scale;
            segment
        })
        .collect()
}

/// Partial download path for a destination
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Completed transfer of one file
#[derive(Debug, Clone)]
pub struct FileTransfer {
    pub bytes_written: u64,
    /// Content-Length announced by the server
    pub content_length: Option<u64>,
    /// Lowercase hex SHA-256 of the bytes written
    pub sha256: String,
}

/// Result of a transfer attempt
#[derive(Debug)]
pub enum TransferOutcome {
    Completed(FileTransfer),
    Cancelled,
}

/// Stream `url` into `part`, reporting per-file progress in [0, 1]
///
/// The part file is removed on failure or cancellation.
pub async fn transfer_file(
    client: &reqwest::Client,
    file: &ArtifactFile,
    part: &Path,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(f64),
) -> InferenceResult<TransferOutcome> {
    let result = stream_to_part(client, file, part, cancel, &mut on_progress).await;
    match &result {
        Ok(TransferOutcome::Completed(_)) => {}
        Ok(TransferOutcome::Cancelled) | Err(_) => remove_if_exists(part).await,
    }
    result
}

async fn stream_to_part(
    client: &reqwest::Client,
    file: &ArtifactFile,
    part: &Path,
    cancel: &CancellationToken,
    on_progress: &mut impl FnMut(f64),
) -> InferenceResult<TransferOutcome> {
    debug!(url = %file.url, file = %file.file_name, "Requesting model file");

    let request = client.get(&file.url).send();
    let mut response = tokio::select! {
        _ = cancel.cancelled() => return Ok(TransferOutcome::Cancelled),
        response = request => response.map_err(|e| {
            InferenceError::DownloadFailed(format!("Request failed: {}", e))
        })?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(InferenceError::DownloadFailed(format!(
            "HTTP {} for {}",
            status, file.file_name
        )));
    }

    let content_length = response.content_length();
    let denominator = content_length
        .filter(|len| *len > 0)
        .unwrap_or(file.expected_size)
        .max(1);

    let mut out = fs::File::create(part).await?;
    let mut hasher = Sha256::new();
    let mut written: u64 = 0;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(file = %file.file_name, written, "Transfer cancelled");
                return Ok(TransferOutcome::Cancelled);
            }
            chunk = response.chunk() => chunk.map_err(|e| {
                InferenceError::DownloadFailed(format!("Stream interrupted: {}", e))
            })?,
        };

        let Some(bytes) = chunk else { break };
        out.write_all(&bytes).await?;
        hasher.update(&bytes);
        written += bytes.len() as u64;
        on_progress(written as f64 / denominator as f64);
    }

    out.flush().await?;
    out.sync_all().await?;
    drop(out);

    on_progress(1.0);

    Ok(TransferOutcome::Completed(FileTransfer {
        bytes_written: written,
        content_length,
        sha256: hex::encode(hasher.finalize()),
    }))
}

/// Check a completed transfer against what the server and catalog promise
pub fn verify_transfer(file: &ArtifactFile, transfer: &FileTransfer) -> InferenceResult<()> {
    if let Some(expected) = transfer.content_length {
        if transfer.bytes_written != expected {
            return Err(InferenceError::DownloadFailed(format!(
                "{}: received {} of {} bytes",
                file.file_name, transfer.bytes_written, expected
            )));
        }
    }

    if transfer.bytes_written < file.min_plausible_size() {
        return Err(InferenceError::DownloadFailed(format!(
            "{}: {} bytes is too small for this model",
            file.file_name, transfer.bytes_written
        )));
    }

    if let Some(expected) = &file.sha256 {
        if !expected.eq_ignore_ascii_case(&transfer.sha256) {
            return Err(InferenceError::DownloadFailed(format!(
                "{}: checksum mismatch",
                file.file_name
            )));
        }
    }

    Ok(())
}

/// Replace `destination` with the verified part file
pub async fn finalize_part(part: &Path, destination: &Path) -> InferenceResult<()> {
    remove_if_exists(destination).await;
    fs::rename(part, destination).await?;
    Ok(())
}

/// Best-effort removal; missing files are fine
pub async fn remove_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}
