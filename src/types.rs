//! Shared option types and helpers.

use serde_json::Value;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Append one segment to a JSON Pointer, escaping `~` and `/`.
pub fn child_path(path: &str, segment: &str) -> String {
    let escaped = segment.replace('~', "~0").replace('/', "~1");
    format!("{}/{}", path, escaped)
}

/// Options for schema refinement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefineOptions {
    /// When true, refined objects keep the unknown-key policy of their
    /// source object. Defaults to false: refined objects are rebuilt with the
    /// default (strip) policy.
    pub preserve_unknown_keys: bool,
}

impl RefineOptions {
    /// Create options with the default rebuild behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the source object's unknown-key policy on refined objects.
    pub fn preserve_unknown_keys(mut self, preserve: bool) -> Self {
        self.preserve_unknown_keys = preserve;
        self
    }
}
