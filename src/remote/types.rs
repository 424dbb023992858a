//! Wire conversion between management API JSON objects and resources.

use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::resource::{Fields, Resource, ResourceKind};

use super::api::ApiResult;

/// Attribute carrying the identity key on the wire.
pub const NAME_FIELD: &str = "name";

/// Converts a listed JSON object into an existing resource.
///
/// The object must carry a string `name` and the kind's identifier
/// attribute. Server-managed attributes are dropped; every other attribute
/// becomes a field.
///
/// # Errors
///
/// Returns an invalid response error if the object is malformed.
pub fn resource_from_wire(kind: ResourceKind, value: Value) -> ApiResult<Resource> {
    let Value::Object(mut object) = value else {
        return Err(ApiError::invalid_response(format!(
            "expected a JSON object for {kind}, got {}",
            type_name(&value)
        )));
    };

    let name = take_string(&mut object, NAME_FIELD).ok_or_else(|| {
        ApiError::invalid_response(format!("{kind} without a string '{NAME_FIELD}'"))
    })?;
    let remote_id = take_string(&mut object, kind.id_field()).ok_or_else(|| {
        ApiError::invalid_response(format!(
            "{kind} '{name}' without a string '{}'",
            kind.id_field()
        ))
    })?;

    let fields: Fields = object
        .into_iter()
        .filter(|(field, _)| !kind.is_read_only(field))
        .collect();

    Ok(Resource::existing(kind, name, remote_id, fields))
}

/// Builds the request body creating `resource`.
#[must_use]
pub fn create_payload(resource: &Resource) -> Value {
    let mut body: Map<String, Value> = resource
        .fields
        .iter()
        .filter(|(field, _)| !resource.kind.is_read_only(field))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    body.insert(NAME_FIELD.to_string(), Value::String(resource.key.clone()));
    Value::Object(body)
}

/// Extracts the remote identifier from a create response.
///
/// # Errors
///
/// Returns an invalid response error if the identifier is missing.
pub fn remote_id_from_wire(kind: ResourceKind, value: &Value) -> ApiResult<String> {
    value
        .get(kind.id_field())
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::invalid_response(format!(
                "create response for {kind} has no '{}'",
                kind.id_field()
            ))
        })
}

fn take_string(object: &mut Map<String, Value>, field: &str) -> Option<String> {
    match object.remove(field) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
