//! Local model artifacts
//!
//! - [`catalog`]: built-in model families and their required files
//! - [`download`]: streamed single-file transfer and progress segments
//! - [`manager`]: per-family lifecycle (download, cancel, import, verify, delete)

pub mod catalog;
pub mod download;
pub mod manager;

pub use catalog::{ArtifactFile, ArtifactSpec, FileRole};
pub use manager::{
    DownloadHandle, DownloadState, DownloadStatus, FileCheck, ImportOutcome,
    ModelArtifactManager, VerificationReport, STORAGE_MARGIN_BYTES,
};

use std::path::{Path, PathBuf};

/// `<root>/models`
pub fn models_root(root_folder: &Path) -> PathBuf {
    root_folder.join("models")
}
