//! Schema derivation from type descriptors.
//!
//! The derived document is shown to the model and used to validate call
//! arguments, so derivation must be deterministic: object keys are emitted in
//! sorted order and `required` follows field declaration order.

use jsonschema::Validator;
use serde_json::{Map, Value, json};

use crate::core::types::TypeDescriptor;
use crate::errors::UnsupportedTypeError;

/// JSON Schema document for one type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    root: Value,
}

impl SchemaDocument {
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Whether the root of the document describes a JSON object.
    pub fn is_object(&self) -> bool {
        self.root.get("type").and_then(Value::as_str) == Some("object")
    }

    /// Compact, byte-stable rendering.
    pub fn to_compact(&self) -> String {
        self.root.to_string()
    }

    pub fn to_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.root).unwrap_or_else(|_| self.to_compact())
    }

    /// Compile the document into a reusable validator.
    pub fn compile(&self, type_name: &str) -> Result<CompiledSchema, UnsupportedTypeError> {
        let validator = jsonschema::validator_for(&self.root).map_err(|err| {
            UnsupportedTypeError::new(type_name, format!("derived schema is invalid: {err}"))
        })?;
        Ok(CompiledSchema { validator })
    }
}

/// A compiled schema validator, shareable across calls.
pub struct CompiledSchema {
    validator: Validator,
}

impl CompiledSchema {
    /// Validate an instance, returning every violation message.
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<String>> {
        if self.validator.is_valid(instance) {
            return Ok(());
        }
        Err(self
            .validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect())
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema").finish_non_exhaustive()
    }
}

/// Derive the schema document for a descriptor.
pub fn derive_schema(ty: &TypeDescriptor) -> SchemaDocument {
    SchemaDocument {
        root: schema_node(ty),
    }
}

fn schema_node(ty: &TypeDescriptor) -> Value {
    match ty {
        TypeDescriptor::Primitive(kind) => json!({ "type": kind.json_type() }),
        TypeDescriptor::List(element) => json!({
            "type": "array",
            "items": schema_node(element),
        }),
        TypeDescriptor::Mapping { value, .. } => json!({
            "type": "object",
            "additionalProperties": schema_node(value),
        }),
        TypeDescriptor::Enum(e) => json!({
            "type": "string",
            "title": e.name,
            "enum": e.variants,
        }),
        TypeDescriptor::Record(r) => {
            let mut properties = Map::new();
            for field in &r.fields {
                properties.insert(field.name.clone(), schema_node(&field.ty));
            }
            let required: Vec<&str> = r.fields.iter().map(|f| f.name.as_str()).collect();
            json!({
                "type": "object",
                "title": r.name,
                "properties": properties,
                "required": required,
            })
        }
    }
}
