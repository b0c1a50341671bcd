//! Conversion between human-readable sizes (`"50gb"`) and byte counts.
//!
//! Units are binary: `kb` is 1024 bytes, `mb` is 1024² bytes and so on up to
//! `tb`. Suffixes are matched case-insensitively.

use thiserror::Error;

const FACTOR: u64 = 1024;

/// Suffixes accepted by [`to_bytes`], smallest first.
const PARSE_UNITS: [&str; 4] = ["kb", "mb", "gb", "tb"];

/// Suffixes produced by [`to_text`], smallest first.
const RENDER_UNITS: [&str; 5] = ["b", "kb", "mb", "gb", "tb"];

/// A size string without a recognized unit or with an invalid number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not convert '{input}' to bytes")]
pub struct SizeFormatError {
    /// The rejected input.
    pub input: String,
}

impl SizeFormatError {
    fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

/// Parses a size such as `"1mb"` or `"2.5GB"` into bytes.
///
/// Fractional byte counts are truncated.
pub fn to_bytes(text: &str) -> Result<u64, SizeFormatError> {
    let lowered = text.to_ascii_lowercase();

    for (step, unit) in PARSE_UNITS.iter().enumerate() {
        let Some(number) = lowered.strip_suffix(unit) else {
            continue;
        };

        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| SizeFormatError::new(text))?;
        if !value.is_finite() || value < 0.0 {
            return Err(SizeFormatError::new(text));
        }

        let multiplier = FACTOR.pow(step as u32 + 1) as f64;
        return Ok((value * multiplier) as u64);
    }

    Err(SizeFormatError::new(text))
}

/// Renders a byte count with two decimals and the largest fitting unit.
pub fn to_text(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut step = 0;

    while value >= FACTOR as f64 && step < RENDER_UNITS.len() - 1 {
        value /= FACTOR as f64;
        step += 1;
    }

    format!("{:.2}{}", value, RENDER_UNITS[step])
}
