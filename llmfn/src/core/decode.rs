//! Response decoding: raw model text -> validated [`DecodedValue`].
//!
//! Decoding is two steps. [`parse_raw`] turns text into a JSON tree, tolerating
//! surrounding whitespace and a single Markdown code fence. [`coerce`] then
//! walks the tree against the return descriptor and fails on the first
//! mismatch, reporting its path (`field.items[2].hp`).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::types::{PrimitiveKind, TypeDescriptor};
use crate::core::value::DecodedValue;
use crate::errors::{DecodeError, DecodeErrorKind};

/// Parse and coerce a raw response.
pub fn decode(raw: &str, ty: &TypeDescriptor) -> Result<DecodedValue, DecodeError> {
    let value = parse_raw(raw)?;
    coerce(&value, ty)
}

/// Parse raw text as a single JSON value.
pub fn parse_raw(raw: &str) -> Result<Value, DecodeError> {
    let body = strip_code_fence(raw.trim());
    serde_json::from_str(body).map_err(|err| {
        DecodeError::new(
            "",
            DecodeErrorKind::NotJson {
                message: err.to_string(),
            },
        )
    })
}

/// Remove one enclosing ```` ``` ```` / ```` ```json ```` fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    match body.find('\n') {
        Some(newline) if !body[..newline].trim_start().starts_with(['{', '[', '"']) => {
            body[newline + 1..].trim()
        }
        _ => body.trim(),
    }
}

/// Coerce a JSON tree into an instance of `ty`.
pub fn coerce(value: &Value, ty: &TypeDescriptor) -> Result<DecodedValue, DecodeError> {
    coerce_at(value, ty, &mut String::new())
}

fn coerce_at(
    value: &Value,
    ty: &TypeDescriptor,
    path: &mut String,
) -> Result<DecodedValue, DecodeError> {
    match ty {
        TypeDescriptor::Primitive(kind) => coerce_primitive(value, *kind, path),
        TypeDescriptor::List(element) => {
            let Value::Array(items) = value else {
                return Err(mismatch(path, "array", value));
            };
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let mark = path.len();
                path.push_str(&format!("[{index}]"));
                out.push(coerce_at(item, element, path)?);
                path.truncate(mark);
            }
            Ok(DecodedValue::List(out))
        }
        TypeDescriptor::Mapping { value: inner, .. } => {
            let Value::Object(entries) = value else {
                return Err(mismatch(path, "object", value));
            };
            let mut out = BTreeMap::new();
            for (key, item) in entries {
                let mark = path.len();
                path.push_str(&format!("[{key:?}]"));
                out.insert(key.clone(), coerce_at(item, inner, path)?);
                path.truncate(mark);
            }
            Ok(DecodedValue::Mapping(out))
        }
        TypeDescriptor::Enum(e) => {
            let Value::String(variant) = value else {
                return Err(mismatch(path, &format!("one of the {} variants", e.name), value));
            };
            if !e.contains(variant) {
                return Err(DecodeError::new(
                    path.clone(),
                    DecodeErrorKind::InvalidEnumVariant {
                        variant: variant.clone(),
                        allowed: e.variants.clone(),
                    },
                ));
            }
            Ok(DecodedValue::Enum {
                name: e.name.clone(),
                variant: variant.clone(),
            })
        }
        TypeDescriptor::Record(r) => {
            let Value::Object(entries) = value else {
                return Err(mismatch(path, &format!("{} object", r.name), value));
            };
            let mut fields = Vec::with_capacity(r.fields.len());
            for field in &r.fields {
                let mark = path.len();
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(&field.name);
                let Some(item) = entries.get(&field.name) else {
                    let err = DecodeError::new(
                        path.clone(),
                        DecodeErrorKind::MissingField {
                            field: field.name.clone(),
                        },
                    );
                    return Err(err);
                };
                fields.push((field.name.clone(), coerce_at(item, &field.ty, path)?));
                path.truncate(mark);
            }
            Ok(DecodedValue::Record {
                name: r.name.clone(),
                fields,
            })
        }
    }
}

fn coerce_primitive(
    value: &Value,
    kind: PrimitiveKind,
    path: &str,
) -> Result<DecodedValue, DecodeError> {
    match (kind, value) {
        (PrimitiveKind::Bool, Value::Bool(b)) => Ok(DecodedValue::Bool(*b)),
        (PrimitiveKind::String, Value::String(s)) => Ok(DecodedValue::String(s.clone())),
        (PrimitiveKind::Float, Value::Number(n)) => n
            .as_f64()
            .map(DecodedValue::Float)
            .ok_or_else(|| mismatch(path, "number", value)),
        (PrimitiveKind::Int, Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(DecodedValue::Int(i));
            }
            // Integral floats (`3.0`) count as integers, matching JSON Schema.
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(DecodedValue::Int(f as i64))
                }
                _ => Err(mismatch(path, "integer", value)),
            }
        }
        (kind, _) => Err(mismatch(path, kind.json_type(), value)),
    }
}

fn mismatch(path: &str, expected: &str, found: &Value) -> DecodeError {
    DecodeError::new(
        path,
        DecodeErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: describe_json(found),
        },
    )
}

fn describe_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer".to_string(),
        Value::Number(n) => format!("number {n}"),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{color, house, person, player};
    use serde_json::json;

    fn kind_of(result: Result<DecodedValue, DecodeError>) -> (String, DecodeErrorKind) {
        let err = result.expect_err("decode should fail");
        (err.path, err.kind)
    }

    #[test]
    fn bare_boolean_decodes() {
        assert_eq!(
            decode("true", &TypeDescriptor::bool()).unwrap(),
            DecodedValue::Bool(true)
        );
    }

    #[test]
    fn rejects_string_for_integer_field() {
        let ty = TypeDescriptor::record("Stats")
            .field::<i64>("hp")
            .build()
            .unwrap();
        let (path, kind) = kind_of(decode(r#"{"hp": "100"}"#, &ty));
        assert_eq!(path, "hp");
        assert_eq!(
            kind,
            DecodeErrorKind::TypeMismatch {
                expected: "integer".to_string(),
                found: "string".to_string(),
            }
        );
    }

    #[test]
    fn integer_rejects_fraction_but_accepts_integral_float() {
        let (_, kind) = kind_of(decode("3.5", &TypeDescriptor::int()));
        assert!(matches!(kind, DecodeErrorKind::TypeMismatch { .. }));
        assert_eq!(
            decode("3.0", &TypeDescriptor::int()).unwrap(),
            DecodedValue::Int(3)
        );
        assert_eq!(
            decode("3", &TypeDescriptor::float()).unwrap(),
            DecodedValue::Float(3.0)
        );
    }

    #[test]
    fn enum_containment() {
        for variant in ["lavender", "indigo", "terracotta"] {
            let raw = serde_json::to_string(variant).unwrap();
            assert_eq!(
                decode(&raw, &color()).unwrap().as_str(),
                Some(variant)
            );
        }
        for bad in ["\"Lavender\"", "\"teal\"", "\"\""] {
            let (_, kind) = kind_of(decode(bad, &color()));
            assert!(matches!(kind, DecodeErrorKind::InvalidEnumVariant { .. }));
        }
    }

    #[test]
    fn reports_nested_list_path() {
        let party = TypeDescriptor::record("Party")
            .field_with("members", TypeDescriptor::list(player()))
            .build()
            .unwrap();
        let raw = json!({
            "members": [
                {"hp": 10, "def_": 1, "name": "a", "mana": 1},
                {"hp": 10, "def_": 1, "name": "b", "mana": 1},
                {"hp": "ten", "def_": 1, "name": "c", "mana": 1}
            ]
        });
        let (path, _) = kind_of(coerce(&raw, &party));
        assert_eq!(path, "members[2].hp");
    }

    #[test]
    fn reports_mapping_entry_path() {
        let ty = TypeDescriptor::mapping(TypeDescriptor::int());
        let (path, _) = kind_of(coerce(&json!({"alice": 1, "bob": true}), &ty));
        assert_eq!(path, "[\"bob\"]");
    }

    #[test]
    fn missing_field_is_reported() {
        let (path, kind) = kind_of(coerce(&json!({"color": "red", "size": 2}), &house()));
        assert_eq!(path, "is_occupied");
        assert_eq!(
            kind,
            DecodeErrorKind::MissingField {
                field: "is_occupied".to_string()
            }
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        let value = coerce(
            &json!({"color": "red", "size": 2, "is_occupied": true, "roof": "tiles"}),
            &house(),
        )
        .expect("decode");
        assert!(value.field("roof").is_none());
        assert_eq!(value.field("size"), Some(&DecodedValue::Int(2)));
    }

    #[test]
    fn nested_record_is_fully_constructed() {
        let raw = r#"{"name": "Ada", "age": 36, "city": "London",
            "home": {"color": "green", "size": 4, "is_occupied": true}}"#;
        let value = decode(raw, &person()).expect("decode");
        let home = value.field("home").expect("home");
        assert_eq!(home.record_name(), Some("House"));
        assert_eq!(home.field("is_occupied"), Some(&DecodedValue::Bool(true)));
    }

    #[test]
    fn strips_markdown_fence() {
        let raw = "```json\n{\"color\": \"red\", \"size\": 1, \"is_occupied\": false}\n```";
        assert!(decode(raw, &house()).is_ok());
        assert_eq!(
            decode("```\n[1, 2]\n```", &TypeDescriptor::list(TypeDescriptor::int())).unwrap(),
            DecodedValue::List(vec![DecodedValue::Int(1), DecodedValue::Int(2)])
        );
    }

    #[test]
    fn prose_is_not_json() {
        let (path, kind) = kind_of(decode("Sure! The answer is yes.", &TypeDescriptor::bool()));
        assert_eq!(path, "");
        assert!(matches!(kind, DecodeErrorKind::NotJson { .. }));
    }

    #[test]
    fn well_formed_values_round_trip() {
        let samples = [
            (
                person(),
                json!({"name": "Ada", "age": 36, "city": "London",
                    "home": {"color": "green", "size": 4, "is_occupied": true}}),
            ),
            (
                TypeDescriptor::mapping(TypeDescriptor::list(TypeDescriptor::float())),
                json!({"a": [1.5, -2.25], "b": []}),
            ),
            (TypeDescriptor::list(color()), json!(["indigo", "lavender"])),
            (TypeDescriptor::string(), json!("multi\nline \"art\"")),
        ];
        for (ty, raw) in samples {
            let decoded = coerce(&raw, &ty).expect("first decode");
            let text = serde_json::to_string(&decoded.to_json()).expect("serialize");
            let again = decode(&text, &ty).expect("second decode");
            assert_eq!(decoded, again, "round trip for {ty}");
        }
    }
}
