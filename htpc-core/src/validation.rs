//! JSON schema validation for remote-method parameters, replies and pushed
//! notification values
//!
//! Implements the subset of JSON Schema (draft 03) that discovered JSON-RPC
//! schemas use: `type` (names or unions of schemas), `properties` with
//! per-property `required`, `additionalProperties`, `items`, `enum`,
//! `minimum`/`maximum`, `minLength`/`maxLength`, `minItems`/`maxItems`,
//! `extends` and `$ref` against a definitions table. Unknown keywords place no
//! constraint on the value.

use serde_json::{Map, Value};
use thiserror::Error;

/// Nested `$ref`/`extends` resolution stops here; deeper levels are unconstrained
const MAX_REF_DEPTH: usize = 32;

/// A value did not match its schema
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("{path}: missing required property '{property}'")]
    MissingProperty { path: String, property: String },

    #[error("{path}: unexpected property '{property}'")]
    UnexpectedProperty { path: String, property: String },

    #[error("{path}: {value} is not one of {allowed}")]
    NotInEnum {
        path: String,
        value: String,
        allowed: String,
    },

    #[error("{path}: {value} is outside the allowed range {min}..={max}")]
    OutOfRange {
        path: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("{path}: length {length} is outside {min}..={max}")]
    Length {
        path: String,
        length: usize,
        min: String,
        max: String,
    },

    #[error("{path}: unusable schema: {reason}")]
    InvalidSchema { path: String, reason: String },
}

/// Schema validator, optionally resolving `$ref` against named definitions
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator<'a> {
    definitions: Option<&'a Map<String, Value>>,
}

impl<'a> Validator<'a> {
    /// Validator without `$ref` definitions; references are unconstrained
    pub fn new() -> Self {
        Self { definitions: None }
    }

    /// Validator resolving `$ref` names in `definitions`
    pub fn with_definitions(definitions: &'a Map<String, Value>) -> Self {
        Self {
            definitions: Some(definitions),
        }
    }

    /// Check `value` against `schema`
    ///
    /// ```rust
    /// use htpc_core::validation::Validator;
    /// use serde_json::json;
    ///
    /// let schema = json!({"type": "string"});
    /// assert!(Validator::new().validate(&json!("pong"), &schema).is_ok());
    /// assert!(Validator::new().validate(&json!(42), &schema).is_err());
    /// ```
    pub fn validate(&self, value: &Value, schema: &Value) -> Result<(), ValidationError> {
        self.check(value, schema, "$", 0)
    }

    fn check(
        &self,
        value: &Value,
        schema: &Value,
        path: &str,
        depth: usize,
    ) -> Result<(), ValidationError> {
        let schema = match schema {
            Value::Object(schema) => schema,
            // An absent schema accepts anything
            Value::Null | Value::Bool(true) => return Ok(()),
            other => {
                return Err(ValidationError::InvalidSchema {
                    path: path.to_string(),
                    reason: format!("expected an object, found {}", describe(other)),
                })
            }
        };

        if let Some(Value::String(reference)) = schema.get("$ref") {
            self.check_reference(value, reference, path, depth)?;
        }

        match schema.get("extends") {
            Some(Value::String(reference)) => self.check_reference(value, reference, path, depth)?,
            Some(Value::Array(bases)) => {
                for base in bases {
                    match base {
                        Value::String(reference) => {
                            self.check_reference(value, reference, path, depth)?
                        }
                        other => self.check(value, other, path, depth + 1)?,
                    }
                }
            }
            Some(base @ Value::Object(_)) => self.check(value, base, path, depth + 1)?,
            _ => {}
        }

        if let Some(expected) = schema.get("type") {
            self.check_type(value, expected, path, depth)?;
        }

        if let Some(Value::Array(allowed)) = schema.get("enum") {
            if !allowed.contains(value) {
                return Err(ValidationError::NotInEnum {
                    path: path.to_string(),
                    value: value.to_string(),
                    allowed: Value::Array(allowed.clone()).to_string(),
                });
            }
        }

        match value {
            Value::Object(map) => self.check_object(map, schema, path, depth),
            Value::Array(items) => self.check_array(items, schema, path, depth),
            Value::String(s) => check_length(
                s.chars().count(),
                schema.get("minLength"),
                schema.get("maxLength"),
                path,
            ),
            Value::Number(n) => check_range(n.as_f64(), schema, path),
            _ => Ok(()),
        }
    }

    fn check_reference(
        &self,
        value: &Value,
        reference: &str,
        path: &str,
        depth: usize,
    ) -> Result<(), ValidationError> {
        if depth >= MAX_REF_DEPTH {
            return Ok(());
        }
        match self.definitions.and_then(|d| d.get(reference)) {
            Some(target) => self.check(value, target, path, depth + 1),
            None => {
                tracing::trace!("Unresolved schema reference {} at {}", reference, path);
                Ok(())
            }
        }
    }

    fn check_type(
        &self,
        value: &Value,
        expected: &Value,
        path: &str,
        depth: usize,
    ) -> Result<(), ValidationError> {
        let matches = match expected {
            Value::String(name) => type_matches(value, name),
            Value::Array(options) => options.iter().any(|option| match option {
                Value::String(name) => type_matches(value, name),
                schema => self.check(value, schema, path, depth + 1).is_ok(),
            }),
            other => {
                return Err(ValidationError::InvalidSchema {
                    path: path.to_string(),
                    reason: format!("'type' must be a name or a list, found {}", describe(other)),
                })
            }
        };

        if matches {
            Ok(())
        } else {
            Err(ValidationError::TypeMismatch {
                path: path.to_string(),
                expected: expected_name(expected),
                found: describe(value).to_string(),
            })
        }
    }

    fn check_object(
        &self,
        map: &Map<String, Value>,
        schema: &Map<String, Value>,
        path: &str,
        depth: usize,
    ) -> Result<(), ValidationError> {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(properties) = properties {
            for (name, property_schema) in properties {
                match map.get(name) {
                    Some(child) => {
                        self.check(child, property_schema, &format!("{}.{}", path, name), depth)?
                    }
                    None if property_schema.get("required") == Some(&Value::Bool(true)) => {
                        return Err(ValidationError::MissingProperty {
                            path: path.to_string(),
                            property: name.clone(),
                        })
                    }
                    None => {}
                }
            }
        }

        if let Some(Value::Array(required)) = schema.get("required") {
            if let Some(missing) = required
                .iter()
                .filter_map(Value::as_str)
                .find(|name| !map.contains_key(*name))
            {
                return Err(ValidationError::MissingProperty {
                    path: path.to_string(),
                    property: missing.to_string(),
                });
            }
        }

        let extra = map
            .iter()
            .filter(|(name, _)| properties.map_or(true, |p| !p.contains_key(*name)));
        match schema.get("additionalProperties") {
            Some(Value::Bool(false)) => {
                if let Some((name, _)) = extra.into_iter().next() {
                    return Err(ValidationError::UnexpectedProperty {
                        path: path.to_string(),
                        property: name.clone(),
                    });
                }
            }
            Some(additional @ Value::Object(_)) => {
                for (name, child) in extra {
                    self.check(child, additional, &format!("{}.{}", path, name), depth)?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn check_array(
        &self,
        items: &[Value],
        schema: &Map<String, Value>,
        path: &str,
        depth: usize,
    ) -> Result<(), ValidationError> {
        check_length(items.len(), schema.get("minItems"), schema.get("maxItems"), path)?;

        match schema.get("items") {
            Some(Value::Array(positional)) => {
                for (index, (item, item_schema)) in items.iter().zip(positional).enumerate() {
                    self.check(item, item_schema, &format!("{}[{}]", path, index), depth)?;
                }
            }
            Some(item_schema @ Value::Object(_)) => {
                for (index, item) in items.iter().enumerate() {
                    self.check(item, item_schema, &format!("{}[{}]", path, index), depth)?;
                }
            }
            _ => {}
        }

        Ok(())
    }
}

/// Validate with a definitionless [`Validator`]
pub fn validate(value: &Value, schema: &Value) -> Result<(), ValidationError> {
    Validator::new().validate(value, schema)
}

fn type_matches(value: &Value, name: &str) -> bool {
    match name {
        "any" => true,
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        // Unknown type names do not constrain
        _ => true,
    }
}

fn expected_name(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(options) => options
            .iter()
            .map(|o| match o {
                Value::String(name) => name.clone(),
                _ => "schema".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_length(
    length: usize,
    min: Option<&Value>,
    max: Option<&Value>,
    path: &str,
) -> Result<(), ValidationError> {
    let min_len = min.and_then(Value::as_u64);
    let max_len = max.and_then(Value::as_u64);
    let too_short = min_len.map_or(false, |m| (length as u64) < m);
    let too_long = max_len.map_or(false, |m| (length as u64) > m);

    if too_short || too_long {
        return Err(ValidationError::Length {
            path: path.to_string(),
            length,
            min: min_len.map_or_else(|| "0".to_string(), |m| m.to_string()),
            max: max_len.map_or_else(|| "∞".to_string(), |m| m.to_string()),
        });
    }
    Ok(())
}

fn check_range(
    number: Option<f64>,
    schema: &Map<String, Value>,
    path: &str,
) -> Result<(), ValidationError> {
    let Some(number) = number else {
        return Ok(());
    };
    let minimum = schema.get("minimum").and_then(Value::as_f64);
    let maximum = schema.get("maximum").and_then(Value::as_f64);

    if minimum.map_or(false, |m| number < m) || maximum.map_or(false, |m| number > m) {
        return Err(ValidationError::OutOfRange {
            path: path.to_string(),
            value: number.to_string(),
            min: minimum.map_or_else(|| "-∞".to_string(), |m| m.to_string()),
            max: maximum.map_or_else(|| "∞".to_string(), |m| m.to_string()),
        });
    }
    Ok(())
}
