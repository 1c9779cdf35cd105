//! Utility modules for mme-ai

pub mod scoped_upload;
pub mod text;

pub use scoped_upload::{sanitize_filename, ScopedUpload};
pub use text::{sanitize_ascii, truncate_chars};

/// Round to a fixed number of decimal places
///
/// Non-finite values pass through unchanged.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
