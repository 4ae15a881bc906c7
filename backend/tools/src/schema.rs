//! Argument validation against a tool's JSON Schema.
//!
//! Supports the subset tool schemas actually use: `type` (single or list),
//! `properties`, `required`, `additionalProperties: false`, `enum`, `items`,
//! `minItems`/`maxItems`, `minLength`/`maxLength`, `minimum`/`maximum`.
//! Unknown keywords are ignored.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct SchemaError {
    /// JSON-pointer-ish location of the offending value (`$` is the root).
    pub path: String,
    pub message: String,
}

impl SchemaError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Check that a tool's parameter schema is usable: an object schema whose
/// `properties` (if present) is an object and `required` only names strings.
pub fn check_schema(schema: &Value) -> Result<(), SchemaError> {
    let Some(obj) = schema.as_object() else {
        return Err(SchemaError::new("$", "schema must be a JSON object"));
    };
    match obj.get("type") {
        None => {}
        Some(Value::String(t)) if t == "object" => {}
        Some(other) => {
            return Err(SchemaError::new("$.type", format!("expected \"object\", got {other}")));
        }
    }
    if let Some(props) = obj.get("properties") {
        if !props.is_object() {
            return Err(SchemaError::new("$.properties", "must be an object"));
        }
    }
    if let Some(required) = obj.get("required") {
        let ok = required
            .as_array()
            .map(|names| names.iter().all(Value::is_string))
            .unwrap_or(false);
        if !ok {
            return Err(SchemaError::new("$.required", "must be an array of property names"));
        }
    }
    Ok(())
}

/// Validate `value` against `schema`, reporting the first violation found.
pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaError> {
    validate_at(schema, value, "$")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    let Some(schema) = schema.as_object() else {
        // `true` / absent sub-schemas accept anything.
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        check_type(expected, value, path)?;
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return Err(SchemaError::new(path, format!("value {value} is not one of {allowed:?}")));
        }
    }

    match value {
        Value::Object(map) => check_object(schema, map, path)?,
        Value::Array(items) => check_array(schema, items, path)?,
        Value::String(s) => check_string(schema, s, path)?,
        Value::Number(n) => {
            if let Some(n) = n.as_f64() {
                check_number(schema, n, path)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn type_matches(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
        }
        _ => true,
    }
}

fn check_type(expected: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    let ok = match expected {
        Value::String(name) => type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| type_matches(name, value)),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(SchemaError::new(path, format!("expected type {expected}, got {}", kind_of(value))))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_object(
    schema: &Map<String, Value>,
    map: &Map<String, Value>,
    path: &str,
) -> Result<(), SchemaError> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(name) {
                return Err(SchemaError::new(path, format!("missing required property '{name}'")));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (key, child) in map {
        let child_path = format!("{path}.{key}");
        match properties.and_then(|p| p.get(key)) {
            Some(child_schema) => validate_at(child_schema, child, &child_path)?,
            None if closed => {
                return Err(SchemaError::new(&child_path, "unexpected property"));
            }
            None => {}
        }
    }
    Ok(())
}

fn check_array(
    schema: &Map<String, Value>,
    items: &[Value],
    path: &str,
) -> Result<(), SchemaError> {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min {
            return Err(SchemaError::new(path, format!("expected at least {min} items")));
        }
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if (items.len() as u64) > max {
            return Err(SchemaError::new(path, format!("expected at most {max} items")));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            validate_at(item_schema, item, &format!("{path}[{i}]"))?;
        }
    }
    Ok(())
}

fn check_string(schema: &Map<String, Value>, s: &str, path: &str) -> Result<(), SchemaError> {
    let len = s.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if len < min {
            return Err(SchemaError::new(path, format!("shorter than {min} characters")));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if len > max {
            return Err(SchemaError::new(path, format!("longer than {max} characters")));
        }
    }
    Ok(())
}

fn check_number(schema: &Map<String, Value>, n: f64, path: &str) -> Result<(), SchemaError> {
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if n < min {
            return Err(SchemaError::new(path, format!("{n} is below minimum {min}")));
        }
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if n > max {
            return Err(SchemaError::new(path, format!("{n} is above maximum {max}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edit_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1 },
                "line": { "type": "integer", "minimum": 1 },
                "mode": { "enum": ["insert", "replace"] },
                "tags": { "type": "array", "items": { "type": "string" }, "maxItems": 2 }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_arguments_pass() {
        let args = json!({"path": "src/main.rs", "line": 3, "mode": "insert", "tags": ["a"]});
        assert!(validate(&edit_schema(), &args).is_ok());
    }

    #[test]
    fn test_missing_required_property() {
        let err = validate(&edit_schema(), &json!({"line": 2})).unwrap_err();
        assert_eq!(err.path, "$");
        assert!(err.message.contains("path"));
    }

    #[test]
    fn test_wrong_types_and_bounds() {
        let err = validate(&edit_schema(), &json!({"path": 7})).unwrap_err();
        assert_eq!(err.path, "$.path");

        let err = validate(&edit_schema(), &json!({"path": "a", "line": 0})).unwrap_err();
        assert_eq!(err.path, "$.line");

        let err = validate(&edit_schema(), &json!({"path": "a", "line": 1.5})).unwrap_err();
        assert_eq!(err.path, "$.line");

        let err = validate(&edit_schema(), &json!({"path": "a", "tags": ["x", "y", "z"]})).unwrap_err();
        assert_eq!(err.path, "$.tags");

        let err = validate(&edit_schema(), &json!({"path": "a", "tags": [1]})).unwrap_err();
        assert_eq!(err.path, "$.tags[0]");
    }

    #[test]
    fn test_enum_and_closed_objects() {
        let err = validate(&edit_schema(), &json!({"path": "a", "mode": "delete"})).unwrap_err();
        assert_eq!(err.path, "$.mode");

        let err = validate(&edit_schema(), &json!({"path": "a", "force": true})).unwrap_err();
        assert_eq!(err.path, "$.force");
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        assert!(validate(&edit_schema(), &json!("src/main.rs")).is_err());
    }

    #[test]
    fn test_check_schema() {
        assert!(check_schema(&edit_schema()).is_ok());
        assert!(check_schema(&json!({})).is_ok());
        assert!(check_schema(&json!({"type": "string"})).is_err());
        assert!(check_schema(&json!({"type": "object", "required": [1]})).is_err());
        assert!(check_schema(&json!([])).is_err());
    }
}
