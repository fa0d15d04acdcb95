//! Constant-marked schema properties
//!
//! A property whose name starts with [`CONSTANT_MARKER`] is filled in by the client
//! from its own configuration instead of by the agent. Exactly one marker is
//! stripped to obtain the constant key: `_API_KEY` reads `API_KEY`, `__X` reads `_X`.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::schema::{schema_properties, schema_required};

pub const CONSTANT_MARKER: char = '_';

pub fn constant_key(property: &str) -> Option<&str> {
    property.strip_prefix(CONSTANT_MARKER)
}

pub fn marked(key: &str) -> String {
    format!("{CONSTANT_MARKER}{key}")
}

/// Remote defaults overridden by local values.
pub fn merge_constants(
    remote: &BTreeMap<String, String>,
    local: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = remote.clone();
    merged.extend(local.iter().map(|(key, value)| (key.clone(), value.clone())));
    merged
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstantPartition {
    /// Constant keys sorted by property name, marker stripped.
    pub constant_properties: Vec<String>,
    pub agent_properties: Map<String, Value>,
    pub agent_required: Vec<String>,
    pub required_constants: Vec<String>,
    /// Constant keys with a non-empty configured value.
    pub resolved_constants: BTreeMap<String, String>,
}

impl ConstantPartition {
    pub fn from_schema(schema: &Value, constants: &BTreeMap<String, String>) -> Self {
        let mut partition = Self::default();

        for (property, definition) in schema_properties(schema) {
            match constant_key(&property) {
                Some(key) => partition.constant_properties.push(key.to_string()),
                None => {
                    partition.agent_properties.insert(property, definition);
                }
            }
        }

        for required in schema_required(schema) {
            match constant_key(&required) {
                Some(key) if partition.constant_properties.iter().any(|known| known == key) => {
                    partition.required_constants.push(key.to_string());
                }
                Some(_) => {}
                None => {
                    if partition.agent_properties.contains_key(&required) {
                        partition.agent_required.push(required);
                    }
                }
            }
        }

        partition.resolved_constants = partition
            .constant_properties
            .iter()
            .filter_map(|key| {
                constants
                    .get(key)
                    .filter(|value| !value.is_empty())
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();

        partition
    }

    pub fn is_exposed(&self) -> bool {
        self.required_constants
            .iter()
            .all(|key| self.resolved_constants.contains_key(key))
    }

    /// The schema shown to the agent: constant properties never appear in it.
    pub fn agent_schema(&self) -> Value {
        let mut schema = json!({
            "type": "object",
            "properties": self.agent_properties,
        });
        if !self.agent_required.is_empty() {
            schema["required"] = json!(self.agent_required);
        }
        schema
    }

    /// Agent arguments with every resolved constant added back under its marked name.
    pub fn merge_into(&self, mut arguments: Map<String, Value>) -> Map<String, Value> {
        for (key, value) in &self.resolved_constants {
            arguments.insert(marked(key), Value::String(value.clone()));
        }
        arguments
    }
}
