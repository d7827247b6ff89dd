//! Lenient parsing for JSON-like text produced by loosely written dumps.
//!
//! The repair is plain substitution: every `'` becomes `"` and every literal
//! `True` becomes `true`. It is only meant for flat records such as
//! `{'date': '2018-02-01', 'success': True}`. Values that contain an
//! apostrophe or the word `True` inside a string are corrupted by the
//! substitution and either fail to parse or come back altered.

use crate::core::error::RateError;
use serde_json::Value;
use tracing::debug;

pub fn repair_json(text: &str) -> Result<Value, RateError> {
    if text.trim().is_empty() {
        return Err(RateError::InvalidInput(
            "Input text cannot be empty.".to_string(),
        ));
    }

    let repaired = text.replace('\'', "\"").replace("True", "true");
    serde_json::from_str(&repaired).map_err(|e| {
        debug!("Failed to parse repaired text '{}': {}", repaired, e);
        RateError::Format(e.to_string())
    })
}

/// Repairs a raw record as delivered by a fetch.
///
/// Structured values pass through, text is run through [`repair_json`], and
/// anything else is rejected.
pub fn repair_value(value: &Value) -> Result<Value, RateError> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::String(text) => repair_json(text),
        Value::Null => Err(RateError::InvalidInput(
            "Input cannot be empty (null).".to_string(),
        )),
        other => Err(RateError::InvalidInput(format!(
            "Input must be text or a mapping, got: {other}"
        ))),
    }
}
