//! Coerces analyzer records into JSON-safe [`NormalizedResult`]s.
//!
//! Each field goes through its own filter. Non-numeric score and region
//! entries are dropped, never defaulted. A region that is missing entirely
//! (or is not a mapping) becomes the all-zero box; a region that is a mapping
//! but lacks some of `x`/`y`/`w`/`h` is left without those keys.

use crate::types::{AnalyzerOutput, FaceAnalysis, NormalizedResult};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub const UNKNOWN_EMOTION: &str = "unknown";
pub const REGION_KEYS: [&str; 4] = ["x", "y", "w", "h"];

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("face {index}: emotion scores must be a mapping, got {kind}")]
    EmotionNotMapping { index: usize, kind: &'static str },
}

/// Normalize analyzer output, wrapping a lone record first.
pub fn normalize_output(output: AnalyzerOutput) -> Result<Vec<NormalizedResult>, NormalizeError> {
    normalize(&output.into_records())
}

/// Normalize a sequence of records, preserving order.
pub fn normalize(records: &[FaceAnalysis]) -> Result<Vec<NormalizedResult>, NormalizeError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| normalize_record(index, record))
        .collect()
}

fn normalize_record(index: usize, record: &FaceAnalysis) -> Result<NormalizedResult, NormalizeError> {
    let emotion = match record.emotion.as_ref() {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(scores)) => numeric_scores(scores),
        Some(other) => {
            return Err(NormalizeError::EmotionNotMapping {
                index,
                kind: value_kind(other),
            })
        }
    };

    Ok(NormalizedResult {
        dominant_emotion: normalize_dominant(record.dominant_emotion.as_ref()),
        emotion,
        region: integer_region(record.region.as_ref()),
    })
}

/// Strings pass through, absent/`null` becomes `"unknown"`, anything else is
/// rendered as JSON text.
pub fn normalize_dominant(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => UNKNOWN_EMOTION.to_string(),
        Some(Value::String(label)) => label.clone(),
        Some(other) => other.to_string(),
    }
}

/// Keep numeric scores as `f64` (booleans count as 1.0/0.0), drop everything
/// else.
pub fn numeric_scores(scores: &Map<String, Value>) -> BTreeMap<String, f64> {
    scores
        .iter()
        .filter_map(|(label, value)| match value {
            Value::Number(n) => n.as_f64().map(|score| (label.clone(), score)),
            Value::Bool(b) => Some((label.clone(), f64::from(u8::from(*b)))),
            _ => None,
        })
        .collect()
}

/// Keep numeric region entries truncated to integers (booleans as 1/0);
/// non-mappings become the all-zero box.
pub fn integer_region(region: Option<&Value>) -> BTreeMap<String, i64> {
    match region {
        Some(Value::Object(fields)) => fields
            .iter()
            .filter_map(|(key, value)| match value {
                Value::Number(n) => Some((key.clone(), truncate(n))),
                Value::Bool(b) => Some((key.clone(), i64::from(*b))),
                _ => None,
            })
            .collect(),
        _ => default_region(),
    }
}

/// `{x: 0, y: 0, w: 0, h: 0}`
pub fn default_region() -> BTreeMap<String, i64> {
    REGION_KEYS.iter().map(|key| (key.to_string(), 0)).collect()
}

fn truncate(n: &Number) -> i64 {
    if let Some(i) = n.as_i64() {
        i
    } else if let Some(u) = n.as_u64() {
        i64::try_from(u).unwrap_or(i64::MAX)
    } else {
        // Saturating float→int cast truncates toward zero.
        n.as_f64().map_or(0, |f| f as i64)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
