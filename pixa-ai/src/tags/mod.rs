//! Tag normalization, validation and cheap auxiliary extractors
//!
//! Everything here is pure (apart from the pluggable reverse geocoder) and
//! never calls an inference backend.

pub mod exif_heuristics;
pub mod hashtags;
pub mod keywords;
pub mod normalizer;
pub mod validator;

pub use exif_heuristics::{ExifHeuristics, PhotoMetadata, Place, ReverseGeocoder, StaticGazetteer};
pub use hashtags::extract_hashtags;
pub use keywords::extract_keywords;
pub use normalizer::{normalize, normalize_result, normalize_tags};
pub use validator::validate_tag;
