//! Error types shared by the Pixa crates and the host collaborators
//! (photo store, text recognizer) they call into.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for shared Pixa operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be located, parsed or written
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Malformed value from a user or config (e.g. an engine preference)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Import source whose name matches no slot of the model family
    #[error("Cannot tell which {family} model file '{file_name}' is")]
    UnrecognizedModelFile { family: String, file_name: String },

    /// Host photo store rejected a write
    #[error("Photo store error: {0}")]
    Store(String),

    /// Host text recognizer failed on an image
    #[error("Text recognition failed: {0}")]
    Recognition(String),
}
