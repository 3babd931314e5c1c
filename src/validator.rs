//! Payload validation against inferred or hand-written schemas.

use serde_json::Value;

use crate::error::{LoadError, SchemaError, ValidateError};
use crate::types::SchemaNode;

/// Validate a payload against an inferred schema node.
///
/// The node is validated under the validator's default draft, so documents
/// stamped with draft-04 by [`crate::to_document`] are not held to that
/// draft's meta-schema (which rejects an empty `required`).
///
/// # Errors
///
/// Returns `ValidateError::Invalid` if the payload doesn't match the schema.
pub fn validate_node(schema: &SchemaNode, payload: &Value) -> Result<(), ValidateError> {
    let schema = serde_json::to_value(schema).map_err(|e| LoadError::InvalidSchema {
        message: e.to_string(),
    })?;
    validate_against_schema(&schema, payload)
}

/// Validate a payload against a raw JSON Schema document.
///
/// # Errors
///
/// Returns `ValidateError::Load` if the schema itself is invalid, or
/// `ValidateError::Invalid` if the payload doesn't match the schema.
pub fn validate_against_schema(schema: &Value, payload: &Value) -> Result<(), ValidateError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| LoadError::InvalidSchema {
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
