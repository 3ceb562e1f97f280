//! Structural invariants the type system alone does not enforce.

use std::collections::HashSet;

use crate::core::types::{PrimitiveKind, TypeDescriptor};

/// Check descriptor invariants:
/// - record and enum names are non-empty
/// - record field names are non-empty and unique
/// - enum variants are non-empty, unique, and there is at least one
/// - mapping keys are strings
///
/// Returns stable error messages (empty on success).
pub fn validate_descriptor(ty: &TypeDescriptor) -> Vec<String> {
    let mut errors = Vec::new();
    validate_node(ty, &mut errors, &ty.type_name());
    errors
}

fn validate_node(ty: &TypeDescriptor, errors: &mut Vec<String>, path: &str) {
    match ty {
        TypeDescriptor::Primitive(_) => {}
        TypeDescriptor::List(element) => {
            validate_node(element, errors, &format!("{path}[]"));
        }
        TypeDescriptor::Mapping { key, value } => {
            if *key != PrimitiveKind::String {
                errors.push(format!(
                    "{path}: mapping keys must be strings, not {}",
                    key.as_str()
                ));
            }
            validate_node(value, errors, &format!("{path}{{}}"));
        }
        TypeDescriptor::Enum(e) => {
            if e.name.trim().is_empty() {
                errors.push(format!("{path}: enum name must be non-empty"));
            }
            if e.variants.is_empty() {
                errors.push(format!("{path}: enum needs at least one variant"));
            }
            let mut seen = HashSet::new();
            for variant in &e.variants {
                if variant.is_empty() {
                    errors.push(format!("{path}: enum variants must be non-empty"));
                } else if !seen.insert(variant.as_str()) {
                    errors.push(format!("{path}: duplicate variant '{variant}'"));
                }
            }
        }
        TypeDescriptor::Record(r) => {
            if r.name.trim().is_empty() {
                errors.push(format!("{path}: record name must be non-empty"));
            }
            let mut seen = HashSet::new();
            for field in &r.fields {
                if field.name.is_empty() {
                    errors.push(format!("{path}: field names must be non-empty"));
                    continue;
                }
                if !seen.insert(field.name.as_str()) {
                    errors.push(format!("{path}: duplicate field '{}'", field.name));
                }
                validate_node(&field.ty, errors, &format!("{path}.{}", field.name));
            }
        }
    }
}
