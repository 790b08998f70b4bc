//! Canonical string form for block content arriving off the wire.
//!
//! Run events may carry block content as a JSON string, object, or array.
//! Node state stores content as a single string, so every write path funnels
//! through [`canonical_content`] to keep the representation uniform: strings
//! pass through untouched, everything else becomes compact JSON text.
//!
//! # Examples
//!
//! ```rust
//! use serde_json::json;
//! use weftrun::utils::content::canonical_content;
//!
//! assert_eq!(canonical_content(&json!("plain text")), "plain text");
//! assert_eq!(canonical_content(&json!({"rows": [1, 2]})), r#"{"rows":[1,2]}"#);
//! assert_eq!(canonical_content(&json!(null)), "null");
//! ```

use serde_json::Value;

/// Normalize a wire value into the single string form node state stores.
///
/// JSON strings are taken as-is (no quoting). Any other value is rendered
/// as compact JSON. Rendering a `Value` cannot fail, so this never loses
/// content.
#[must_use]
pub fn canonical_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
