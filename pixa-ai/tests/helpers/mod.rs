//! Test Helper Utilities
//!
//! Shared utilities for testing pixa-ai

#![allow(dead_code, unused_imports)]

pub mod fixture_server;
pub mod inference_server;
pub mod mocks;

// Re-export commonly used items
pub use fixture_server::{fixture_bytes, FixtureServer};
pub use inference_server::{InferenceServer, RecordedRequest, CLOUD_ANSWER, ON_DEVICE_ANSWER};
pub use mocks::{RecordingStore, RuntimeCall, ScriptedRuntime};
