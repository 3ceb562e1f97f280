//! Check execution against decoded call results.
//!
//! Checks compare the JSON rendering of a decoded value
//! ([`llmfn::core::value::DecodedValue::to_json`]) with expectations from the
//! suite file. A call that failed has no value and fails every check.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Expectation on a case's decoded value.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Check {
    /// The value equals `value`; numbers compare numerically (`6 == 6.0`).
    Equals { value: Value },
    /// The value equals one of `values`.
    OneOf { values: Vec<Value> },
    /// Strings are not blank; lists, mappings and records are not empty.
    NonEmpty,
    /// A string containing `text`, or a list with a `text` element.
    Contains { text: String },
    /// A string starting with `prefix`, ignoring leading whitespace.
    StartsWith { prefix: String },
}

impl Check {
    pub fn validate(&self) -> Result<()> {
        match self {
            Check::OneOf { values } if values.is_empty() => {
                bail!("one_of.values must be non-empty")
            }
            Check::Contains { text } if text.is_empty() => bail!("contains.text must be non-empty"),
            Check::StartsWith { prefix } if prefix.is_empty() => {
                bail!("starts_with.prefix must be non-empty")
            }
            _ => Ok(()),
        }
    }

    /// Short label used to aggregate pass rates across runs.
    pub fn label(&self) -> String {
        match self {
            Check::Equals { value } => format!("equals({value})"),
            Check::OneOf { values } => format!("one_of({})", values.len()),
            Check::NonEmpty => "non_empty".to_string(),
            Check::Contains { text } => format!("contains({text:?})"),
            Check::StartsWith { prefix } => format!("starts_with({prefix:?})"),
        }
    }

    pub fn passes(&self, value: &Value) -> bool {
        match self {
            Check::Equals { value: expected } => json_eq(value, expected),
            Check::OneOf { values } => values.iter().any(|expected| json_eq(value, expected)),
            Check::NonEmpty => match value {
                Value::String(s) => !s.trim().is_empty(),
                Value::Array(items) => !items.is_empty(),
                Value::Object(entries) => !entries.is_empty(),
                Value::Null => false,
                Value::Bool(_) | Value::Number(_) => true,
            },
            Check::Contains { text } => match value {
                Value::String(s) => s.contains(text.as_str()),
                Value::Array(items) => items
                    .iter()
                    .any(|item| item.as_str() == Some(text.as_str())),
                _ => false,
            },
            Check::StartsWith { prefix } => value
                .as_str()
                .is_some_and(|s| s.trim_start().starts_with(prefix.as_str())),
        }
    }
}

/// Result of running a single check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckOutcome {
    pub label: String,
    pub passed: bool,
}

/// Run `checks` against a call's value, `None` when the call failed.
pub fn run_checks(checks: &[Check], value: Option<&Value>) -> Vec<CheckOutcome> {
    checks
        .iter()
        .map(|check| {
            let passed = value.is_some_and(|value| check.passes(value));
            debug!(check = %check.label(), passed, "check result");
            CheckOutcome {
                label: check.label(),
                passed,
            }
        })
        .collect()
}

fn json_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => l == r,
            _ => l.as_f64() == r.as_f64(),
        },
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(l, r)| json_eq(l, r))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l
                    .iter()
                    .all(|(key, l)| r.get(key).is_some_and(|r| json_eq(l, r)))
        }
        _ => left == right,
    }
}
