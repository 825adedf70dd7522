//! # Pixa Common Library
//!
//! Shared code for the Pixa crates including:
//! - Error and result types
//! - Configuration loading (root folder, TOML bootstrap config)
//! - Event types and the broadcast event bus
//! - Human-readable size formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_size;

pub use error::{Error, Result};
