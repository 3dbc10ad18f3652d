//! Lenient decoding of server-reported fields
//!
//! The status endpoint and the push channel report the same fields with
//! loose typing: progress may be fractional or out of range, errors may be
//! strings or objects. Both paths decode through these helpers.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Round and clamp a reported progress value to 0..=100
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn clamp_progress(progress: f64) -> u8 {
    if progress.is_nan() {
        return 0;
    }
    progress.round().clamp(0.0, 100.0) as u8
}

/// Human-readable text of a reported error
///
/// Strings pass through; objects yield their `message` or `detail`; anything
/// else is serialized.
#[must_use]
pub fn error_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Object(ref map) => map
            .get("message")
            .or_else(|| map.get("detail"))
            .and_then(Value::as_str)
            .map_or_else(|| value.to_string(), str::to_string),
        other => other.to_string(),
    }
}

/// Deserialize progress from any JSON number (or numeric string); null is 0
///
/// # Errors
/// - When the value is neither a number, a numeric string nor null
pub fn progress<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(0),
        Value::Number(n) => Ok(n.as_f64().map_or(0, clamp_progress)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(clamp_progress)
            .map_err(|_| serde::de::Error::custom(format!("invalid progress: {s:?}"))),
        other => Err(serde::de::Error::custom(format!("invalid progress: {other}"))),
    }
}

/// Deserialize an optional error from a string, an object or any JSON value
///
/// # Errors
/// - Only when the input is not valid JSON
pub fn error<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?
        .filter(|value| !value.is_null())
        .map(error_text))
}
