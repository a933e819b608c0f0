//! Post-processing: turn the model's raw completion into a JSON object.
//!
//! Even when told "plain JSON only", vision models regularly wrap the answer
//! in ` ```json ... ``` ` fences or prepend a byte-order mark. These rules
//! remove such wrappers without touching content:
//!
//! 1. Strip every markdown fence marker (` ```json `, ` ```JSON `, ` ``` `)
//! 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 3. Trim surrounding whitespace
//!
//! Whatever remains must parse as a JSON **object**. Anything else (prose,
//! an array, a bare number) is a malformed completion; there is no
//! best-effort salvage of partial answers.

use crate::error::IngestError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Untrusted field map produced by the model.
pub type RawBill = Map<String, Value>;

/// Clean a raw completion and parse it as a JSON object.
///
/// # Errors
/// [`IngestError::MalformedCompletion`] when the cleaned text is not valid
/// JSON or not an object. The error quotes the beginning of the raw text.
pub fn parse_completion(raw: &str) -> Result<RawBill, IngestError> {
    let cleaned = clean_completion(raw);

    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(IngestError::malformed(
            format!("expected a JSON object, got {}", json_kind(&other)),
            raw,
        )),
        Err(e) => Err(IngestError::malformed(e.to_string(), raw)),
    }
}

/// Apply the cleanup rules, returning text ready for `serde_json`.
pub fn clean_completion(raw: &str) -> String {
    let s = strip_fence_markers(raw);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip fence markers ──────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```(?:json)?").unwrap());

fn strip_fence_markers(input: &str) -> String {
    RE_FENCE.replace_all(input, "").to_string()
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
