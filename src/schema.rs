//! Input/output schema adapters
//!
//! Every capability schema goes through the [`Schema`] trait so the registry never
//! cares which validation strategy backs a tool. Two adapters ship with the crate:
//! [`JsonSchema`] compiles a raw JSON Schema document with the `jsonschema` crate,
//! [`Typed`] validates by deserializing into a Rust type.

use std::{fmt, marker::PhantomData};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

const MAX_REPORTED_ERRORS: usize = 5;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid json schema: {0}")]
    Compile(String),
}

pub trait Schema: Send + Sync {
    /// Validates `input`, returning the normalized value or the list of violations.
    fn validate(&self, input: &Value) -> Result<Value, Vec<String>>;

    fn to_json_schema(&self) -> Value;
}

pub struct JsonSchema {
    document: Value,
    validator: jsonschema::Validator,
}

impl JsonSchema {
    pub fn new(document: Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::validator_for(&document)
            .map_err(|err| SchemaError::Compile(err.to_string()))?;
        Ok(Self {
            document,
            validator,
        })
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl Schema for JsonSchema {
    fn validate(&self, input: &Value) -> Result<Value, Vec<String>> {
        if self.validator.is_valid(input) {
            return Ok(input.clone());
        }

        let errors = self
            .validator
            .iter_errors(input)
            .take(MAX_REPORTED_ERRORS)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        if errors.is_empty() {
            return Err(vec!["input does not match schema".to_string()]);
        }
        Err(errors)
    }

    fn to_json_schema(&self) -> Value {
        self.document.clone()
    }
}

/// Validates by round-tripping the input through `T`, so serde defaults and
/// renames are applied to what the handler receives.
pub struct Typed<T> {
    document: Value,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Typed<T>
where
    T: DeserializeOwned + Serialize,
{
    pub fn new(document: Value) -> Self {
        Self {
            document,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typed")
            .field("type", &std::any::type_name::<T>())
            .field("document", &self.document)
            .finish()
    }
}

impl<T> Schema for Typed<T>
where
    T: DeserializeOwned + Serialize,
{
    fn validate(&self, input: &Value) -> Result<Value, Vec<String>> {
        let parsed: T = serde_json::from_value(input.clone()).map_err(|err| vec![err.to_string()])?;
        serde_json::to_value(parsed).map_err(|err| vec![err.to_string()])
    }

    fn to_json_schema(&self) -> Value {
        self.document.clone()
    }
}

pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn is_object_schema(document: &Value) -> bool {
    match document.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(_) => false,
        None => document.get("properties").is_some_and(Value::is_object),
    }
}

pub fn schema_properties(document: &Value) -> Map<String, Value> {
    document
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

pub fn schema_required(document: &Value) -> Vec<String> {
    document
        .get("required")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
