//! Decoded values: typed instances reconstructed from model output.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

/// An instance that matches its return descriptor exactly.
///
/// Records keep declaration order; extra fields sent by the model are already
/// gone by the time a value is built.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    List(Vec<DecodedValue>),
    Mapping(BTreeMap<String, DecodedValue>),
    Enum {
        name: String,
        variant: String,
    },
    Record {
        name: String,
        fields: Vec<(String, DecodedValue)>,
    },
}

impl DecodedValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DecodedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecodedValue::String(s) => Some(s),
            DecodedValue::Enum { variant, .. } => Some(variant),
            _ => None,
        }
    }

    /// Field of a record value.
    pub fn field(&self, name: &str) -> Option<&DecodedValue> {
        match self {
            DecodedValue::Record { fields, .. } => {
                fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Record name, if this is a record.
    pub fn record_name(&self) -> Option<&str> {
        match self {
            DecodedValue::Record { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Canonical JSON form, as it would appear in a well-formed response.
    pub fn to_json(&self) -> Value {
        match self {
            DecodedValue::Int(i) => Value::Number((*i).into()),
            DecodedValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            DecodedValue::Bool(b) => Value::Bool(*b),
            DecodedValue::String(s) => Value::String(s.clone()),
            DecodedValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            DecodedValue::Mapping(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            DecodedValue::Enum { variant, .. } => Value::String(variant.clone()),
            DecodedValue::Record { fields, .. } => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// Convert into a caller-defined Rust type through serde.
    pub fn into_typed<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }
}
