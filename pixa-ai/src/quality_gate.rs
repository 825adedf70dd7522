//! Text Quality Gate
//!
//! Decides whether text recognized in a photo is worth sending to a text
//! backend. Receipts, signs and posters pass; stray symbols, serial numbers
//! and OCR noise do not.
//!
//! # Rules
//! - Trimmed length (in characters) must be at least `min_chars`
//! - Letters (alphabetic or ideographic) must make up more than
//!   `min_letter_ratio` of the non-whitespace characters

use tracing::debug;

/// Quality thresholds for recognized text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextQualityGate {
    /// Minimum trimmed length in characters
    min_chars: usize,
    /// Letter share must exceed this
    min_letter_ratio: f64,
}

impl Default for TextQualityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TextQualityGate {
    /// Gate with default thresholds (10 characters, 30% letters)
    pub fn new() -> Self {
        Self {
            min_chars: 10,
            min_letter_ratio: 0.3,
        }
    }

    /// Gate with custom thresholds
    pub fn with_thresholds(min_chars: usize, min_letter_ratio: f64) -> Self {
        Self {
            min_chars,
            min_letter_ratio: min_letter_ratio.clamp(0.0, 1.0),
        }
    }

    /// Whether `text` is informative enough for tag extraction
    pub fn is_usable(&self, text: &str) -> bool {
        let trimmed = text.trim();
        let length = trimmed.chars().count();
        if length < self.min_chars {
            debug!(length, min = self.min_chars, "Recognized text too short");
            return false;
        }

        let ratio = letter_ratio(trimmed);
        if ratio <= self.min_letter_ratio {
            debug!(ratio, min = self.min_letter_ratio, "Recognized text mostly non-letters");
            return false;
        }

        true
    }
}

/// Share of letters among non-whitespace characters (0 for empty input)
pub fn letter_ratio(text: &str) -> f64 {
    let (letters, total) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(letters, total), c| {
            (letters + usize::from(c.is_alphabetic()), total + 1)
        });

    if total == 0 {
        0.0
    } else {
        letters as f64 / total as f64
    }
}
