//! Helpers for reading values out of target documents.
//!
//! Domain records arriving from peer services are arbitrary JSON documents.
//! Segment conditions and email templates both address fields inside them
//! with dotted paths (`customer.primaryEmail`), so the lookup lives here.

use serde_json::Value as JsonValue;

/// Looks up a dotted path inside a JSON document.
///
/// Returns `None` if any path component is missing or traverses a
/// non-object value.
#[must_use]
pub fn lookup_path<'a>(document: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = document;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Writes a value at a dotted path inside a JSON document.
///
/// Intermediate objects are created as needed; writing through a
/// non-object value replaces it with an object.
pub fn set_path(document: &mut JsonValue, path: &str, value: JsonValue) {
    let mut current = document;
    let mut parts = path.split('.').peekable();

    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = JsonValue::Object(serde_json::Map::new());
        }
        let JsonValue::Object(map) = current else {
            return;
        };

        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
    }
}

/// Renders a JSON value the way it should appear inside user-facing text.
///
/// Strings render without quotes; scalars use their JSON form; arrays and
/// objects fall back to compact JSON.
#[must_use]
pub fn value_to_display_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
