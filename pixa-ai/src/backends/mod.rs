//! Inference backends
//!
//! Every engine implements [`InferenceBackend`](crate::types::InferenceBackend):
//! - [`cloud`]: hosted messages API (text + image)
//! - [`on_device`]: system inference service on loopback (text)
//! - [`local_text`]: downloaded language model via the local runtime (text)
//! - [`local_vision`]: downloaded vision model via the local runtime (image)
//!
//! All of them share [`prompts`] and [`response_parser`].

pub mod cloud;
pub mod local_text;
pub mod local_vision;
pub mod on_device;
pub mod prompts;
pub mod response_parser;
pub mod runtime;

pub use cloud::{CloudBackend, CloudSettings};
pub use local_text::LocalTextBackend;
pub use local_vision::{LocalVisionBackend, VISION_CONFIDENCE_BONUS};
pub use on_device::{OnDeviceBackend, OnDeviceSettings};
pub use runtime::{LlamaCliRuntime, LocalRuntime};
