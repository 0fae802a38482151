pub mod table;
pub mod time;

use serde_json::Value;

/// Plain-text rendering of a result cell; SQL `NULL` renders as an empty string.
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
