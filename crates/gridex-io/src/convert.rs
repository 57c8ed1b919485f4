//! Safe numeric conversions and locale-tolerant parsing for untrusted input.
//!
//! Direct `as` casts silently wrap or truncate when parsing hostile files;
//! these checked variants reject NaN, infinities, negatives going into
//! unsigned types, and overflow. `parse_flexible_f64` additionally accepts
//! decimal-comma numbers, which several European export tools emit.

use anyhow::{anyhow, Result};

/// Safely convert f64 to usize with bounds checking.
pub fn safe_f64_to_usize(value: f64) -> Result<usize> {
    if !value.is_finite() {
        return Err(anyhow!(
            "cannot convert non-finite value to usize: {}",
            value
        ));
    }
    if value < 0.0 {
        return Err(anyhow!("cannot convert negative value to usize: {}", value));
    }
    // any f64 > usize::MAX is also > usize::MAX as f64, so the comparison
    // is safe despite the cast losing precision
    if value > usize::MAX as f64 {
        return Err(anyhow!("value {} exceeds maximum usize", value));
    }
    Ok(value as usize)
}

/// Safely convert f64 to i64 with bounds checking.
pub fn safe_f64_to_i64(value: f64) -> Result<i64> {
    if !value.is_finite() {
        return Err(anyhow!("cannot convert non-finite value to i64: {}", value));
    }
    if value < i64::MIN as f64 || value > i64::MAX as f64 {
        return Err(anyhow!("value {} out of i64 range", value));
    }
    Ok(value as i64)
}

/// Parse a float accepting both `1.5` and the decimal-comma form `1,5`.
///
/// A comma is only treated as a decimal separator when the text contains no
/// period, so `1,234.5` still parses as a thousands-grouped `1234.5`.
pub fn parse_flexible_f64(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }
    if trimmed.contains('.') {
        // period present: commas are grouping separators
        trimmed.replace(',', "").parse().ok()
    } else {
        trimmed.replace(',', ".").parse().ok()
    }
}

/// Parse an integer tolerating surrounding whitespace and a trailing `.0`.
pub fn parse_flexible_i64(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    parse_flexible_f64(trimmed).and_then(|f| safe_f64_to_i64(f).ok().filter(|_| f.fract() == 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usize_conversion_bounds() {
        assert_eq!(safe_f64_to_usize(42.0).unwrap(), 42);
        assert!(safe_f64_to_usize(-1.0).is_err());
        assert!(safe_f64_to_usize(f64::NAN).is_err());
        assert!(safe_f64_to_usize(f64::INFINITY).is_err());
    }

    #[test]
    fn i64_conversion_bounds() {
        assert_eq!(safe_f64_to_i64(-100.0).unwrap(), -100);
        assert!(safe_f64_to_i64(1e300).is_err());
    }

    #[test]
    fn flexible_float_accepts_decimal_comma() {
        assert_eq!(parse_flexible_f64("1.5"), Some(1.5));
        assert_eq!(parse_flexible_f64("1,5"), Some(1.5));
        assert_eq!(parse_flexible_f64(" 2,75 "), Some(2.75));
        assert_eq!(parse_flexible_f64("1,234.5"), Some(1234.5));
        assert_eq!(parse_flexible_f64(""), None);
        assert_eq!(parse_flexible_f64("abc"), None);
    }

    #[test]
    fn flexible_int_tolerates_float_notation() {
        assert_eq!(parse_flexible_i64("14"), Some(14));
        assert_eq!(parse_flexible_i64("14.0"), Some(14));
        assert_eq!(parse_flexible_i64("14.5"), None);
    }
}
