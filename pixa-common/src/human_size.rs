//! Human-readable byte size formatting
//!
//! Uses decimal (SI) units the way file managers report file sizes, so a
//! 2,080,000,000 byte model shows as "2.08 GB".

/// Unit thresholds (bytes)
const KB: u64 = 1_000;
const MB: u64 = 1_000_000;
const GB: u64 = 1_000_000_000;

/// Format a byte count for display.
///
/// - `>= 1 GB` → `X.XX GB` (trailing zeros trimmed)
/// - `>= 1 MB` → `X MB`
/// - `>= 1 KB` → `X KB`
/// - otherwise `X bytes`
///
/// # Examples
///
/// ```
/// use pixa_common::human_size::format_human_size;
///
/// assert_eq!(format_human_size(2_080_000_000), "2.08 GB");
/// assert_eq!(format_human_size(1_500_000_000), "1.5 GB");
/// assert_eq!(format_human_size(959_000_000), "959 MB");
/// assert_eq!(format_human_size(512), "512 bytes");
/// ```
pub fn format_human_size(bytes: u64) -> String {
    if bytes >= GB {
        let gigabytes = bytes as f64 / GB as f64;
        let rounded_2dp = (gigabytes * 100.0).round() / 100.0;

        if (rounded_2dp - rounded_2dp.floor()).abs() < 0.001 {
            format!("{:.0} GB", rounded_2dp)
        } else if (rounded_2dp * 10.0 - (rounded_2dp * 10.0).floor()).abs() < 0.001 {
            format!("{:.1} GB", rounded_2dp)
        } else {
            format!("{:.2} GB", rounded_2dp)
        }
    } else if bytes >= MB {
        format!("{:.0} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format an optional byte count; `None` renders as "-"
pub fn format_human_size_opt(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format_human_size(bytes),
        None => "-".to_string(),
    }
}
