//! Content hash of an external morphology row

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::MorphologyRow;

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Canonical text form of a row: compact JSON with keys in sorted order.
///
/// Null values and empty strings are dropped, so a field that is absent and a
/// field that is null produce the same text. Values keep their JSON type and
/// escaping, so `80` and `"80"` differ.
#[must_use]
pub fn canonical_form(row: &MorphologyRow) -> String {
    let fields: Map<String, Value> = row
        .iter()
        .filter(|(_, value)| !is_blank(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(fields).to_string()
}

/// SHA-256 (lowercase hex) of the row's canonical form.
///
/// ```rust
/// use serde_json::json;
/// use synphys_core::morphology::{content_hash, MorphologyRow};
///
/// let a: MorphologyRow = serde_json::from_value(json!({"dendrite_type": "spiny", "note": null})).unwrap();
/// let b: MorphologyRow = serde_json::from_value(json!({"dendrite_type": "spiny"})).unwrap();
/// assert_eq!(content_hash(&a), content_hash(&b));
/// ```
#[must_use]
pub fn content_hash(row: &MorphologyRow) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_form(row).as_bytes());
    format!("{:x}", hasher.finalize())
}
