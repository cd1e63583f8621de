//! Payload validation through exported JSON Schema.
//!
//! [`Schema::parse`] is the native check; this module checks the same
//! payload with `jsonschema` against the document [`to_json_schema`]
//! produces, which is what consumers of the exported documents see.

use serde_json::Value;

use crate::error::{SchemaError, ValidateError};
use crate::export::to_json_schema;
use crate::schema::Schema;

/// Validate a payload against the JSON Schema export of `schema`.
///
/// # Errors
///
/// Returns `ValidateError::Invalid` with every violation if the payload
/// doesn't match.
pub fn validate(schema: &Schema, payload: &Value) -> Result<(), ValidateError> {
    validate_against_json_schema(&to_json_schema(schema), payload)
}

/// Validate a payload against an already exported JSON Schema document.
///
/// Use this when validating many payloads against one export.
pub fn validate_against_json_schema(document: &Value, payload: &Value) -> Result<(), ValidateError> {
    let validator =
        jsonschema::validator_for(document).map_err(|e| ValidateError::InvalidSchema {
            message: e.to_string(),
        })?;

    let errors: Vec<SchemaError> = validator
        .iter_errors(payload)
        .map(|e| SchemaError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}
