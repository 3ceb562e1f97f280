//! Structural type descriptors for declared parameters and return values.
//!
//! A [`TypeDescriptor`] is the closed set of shapes the pipeline can prompt for
//! and decode. Anything outside it is rejected at declaration time with an
//! [`UnsupportedTypeError`].

use std::fmt;

use crate::core::invariants::validate_descriptor;
use crate::errors::UnsupportedTypeError;

/// Scalar kinds. `Int` and `Float` are distinct shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Int,
    Float,
    Bool,
    String,
}

impl PrimitiveKind {
    /// JSON Schema `type` keyword for this kind.
    pub fn json_type(self) -> &'static str {
        match self {
            PrimitiveKind::Int => "integer",
            PrimitiveKind::Float => "number",
            PrimitiveKind::Bool => "boolean",
            PrimitiveKind::String => "string",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::Int => "int",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::String => "str",
        }
    }
}

/// A named enumeration with ordered, case-sensitive string variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumType {
    pub fn contains(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

/// One record field, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: TypeDescriptor,
}

/// A named record. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<Field>,
}

impl RecordType {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Primitive(PrimitiveKind),
    List(Box<TypeDescriptor>),
    /// String-keyed mapping; `key` is always [`PrimitiveKind::String`] once validated.
    Mapping {
        key: PrimitiveKind,
        value: Box<TypeDescriptor>,
    },
    Enum(EnumType),
    Record(RecordType),
}

impl TypeDescriptor {
    pub fn int() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::Int)
    }

    pub fn float() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::Float)
    }

    pub fn bool() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::Bool)
    }

    pub fn string() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::String)
    }

    pub fn list(element: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(element))
    }

    /// String-keyed mapping from a value descriptor.
    pub fn mapping(value: TypeDescriptor) -> Self {
        TypeDescriptor::Mapping {
            key: PrimitiveKind::String,
            value: Box::new(value),
        }
    }

    /// Build an enum descriptor, rejecting empty or duplicate variant sets.
    pub fn enumeration<I, S>(name: &str, variants: I) -> Result<Self, UnsupportedTypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeDescriptor::Enum(EnumType {
            name: name.to_string(),
            variants: variants.into_iter().map(Into::into).collect(),
        })
        .validated()
    }

    /// Start a record descriptor; see [`RecordBuilder`].
    pub fn record(name: &str) -> RecordBuilder {
        RecordBuilder::new(name)
    }

    /// Name used in prompts and error messages (`list[int]`, `House`, ...).
    pub fn type_name(&self) -> String {
        self.to_string()
    }

    /// Check descriptor invariants, returning `self` when they hold.
    pub fn validated(self) -> Result<Self, UnsupportedTypeError> {
        let errors = validate_descriptor(&self);
        if errors.is_empty() {
            return Ok(self);
        }
        Err(UnsupportedTypeError::new(self.type_name(), errors.join("; ")))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive(kind) => f.write_str(kind.as_str()),
            TypeDescriptor::List(element) => write!(f, "list[{element}]"),
            TypeDescriptor::Mapping { key, value } => {
                write!(f, "dict[{}, {value}]", key.as_str())
            }
            TypeDescriptor::Enum(e) => f.write_str(&e.name),
            TypeDescriptor::Record(r) => f.write_str(&r.name),
        }
    }
}

/// Incremental record declaration.
///
/// The first failure (an unsupported field type) is kept and reported by
/// [`RecordBuilder::build`], so declarations read as a single chain.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    name: String,
    fields: Vec<Field>,
    error: Option<UnsupportedTypeError>,
}

impl RecordBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            error: None,
        }
    }

    /// Add a field whose shape comes from a Rust type.
    pub fn field<T: Describe>(self, name: &str) -> Self {
        match T::describe() {
            Ok(ty) => self.field_with(name, ty),
            Err(err) => self.fail(name, err),
        }
    }

    /// Add a field with an explicit descriptor.
    pub fn field_with(mut self, name: &str, ty: TypeDescriptor) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            ty,
        });
        self
    }

    fn fail(mut self, field: &str, err: UnsupportedTypeError) -> Self {
        if self.error.is_none() {
            self.error = Some(UnsupportedTypeError::new(
                self.name.clone(),
                format!("field `{field}`: {err}"),
            ));
        }
        self
    }

    pub fn build(self) -> Result<TypeDescriptor, UnsupportedTypeError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        TypeDescriptor::Record(RecordType {
            name: self.name,
            fields: self.fields,
        })
        .validated()
    }
}

/// Rust types with a structural description.
///
/// Implemented for integers, floats, `bool`, `String`, `Vec<T>` and
/// string-keyed maps. Records and enums implement it by hand:
///
/// ```
/// use llmfn::core::types::{Describe, TypeDescriptor};
/// use llmfn::errors::UnsupportedTypeError;
///
/// struct House { color: String, size: i64, is_occupied: bool }
///
/// impl Describe for House {
///     fn describe() -> Result<TypeDescriptor, UnsupportedTypeError> {
///         TypeDescriptor::record("House")
///             .field::<String>("color")
///             .field::<i64>("size")
///             .field::<bool>("is_occupied")
///             .build()
///     }
/// }
///
/// assert_eq!(House::describe().unwrap().to_string(), "House");
/// ```
pub trait Describe {
    fn describe() -> Result<TypeDescriptor, UnsupportedTypeError>;
}

macro_rules! describe_primitive {
    ($kind:expr => $($ty:ty),+) => {
        $(
            impl Describe for $ty {
                fn describe() -> Result<TypeDescriptor, UnsupportedTypeError> {
                    Ok(TypeDescriptor::Primitive($kind))
                }
            }
        )+
    };
}

describe_primitive!(PrimitiveKind::Int => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
describe_primitive!(PrimitiveKind::Float => f32, f64);
describe_primitive!(PrimitiveKind::Bool => bool);
describe_primitive!(PrimitiveKind::String => String);

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> Result<TypeDescriptor, UnsupportedTypeError> {
        Ok(TypeDescriptor::list(T::describe()?))
    }
}

impl<K: Describe, V: Describe> Describe for std::collections::HashMap<K, V> {
    fn describe() -> Result<TypeDescriptor, UnsupportedTypeError> {
        describe_mapping::<K, V>("HashMap")
    }
}

impl<K: Describe, V: Describe> Describe for std::collections::BTreeMap<K, V> {
    fn describe() -> Result<TypeDescriptor, UnsupportedTypeError> {
        describe_mapping::<K, V>("BTreeMap")
    }
}

fn describe_mapping<K: Describe, V: Describe>(
    container: &str,
) -> Result<TypeDescriptor, UnsupportedTypeError> {
    let key = K::describe()?;
    let value = V::describe()?;
    match key {
        TypeDescriptor::Primitive(PrimitiveKind::String) => Ok(TypeDescriptor::mapping(value)),
        other => Err(UnsupportedTypeError::new(
            format!("{container}<{other}, {value}>"),
            "mapping keys must be strings",
        )),
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> Result<TypeDescriptor, UnsupportedTypeError> {
        let inner = T::describe()?;
        Err(UnsupportedTypeError::new(
            format!("Option<{inner}>"),
            "optional values have no structural shape; every field is required",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn primitives_and_containers_describe() {
        assert_eq!(u8::describe().unwrap(), TypeDescriptor::int());
        assert_eq!(f32::describe().unwrap(), TypeDescriptor::float());
        assert_eq!(
            Vec::<String>::describe().unwrap(),
            TypeDescriptor::list(TypeDescriptor::string())
        );
        assert_eq!(
            HashMap::<String, Vec<i64>>::describe().unwrap().to_string(),
            "dict[str, list[int]]"
        );
    }

    #[test]
    fn non_string_map_keys_are_unsupported() {
        let err = BTreeMap::<i32, String>::describe().unwrap_err();
        assert_eq!(err.type_name, "BTreeMap<int, str>");
        assert!(err.reason.contains("mapping keys must be strings"));
    }

    #[test]
    fn option_is_unsupported() {
        let err = Option::<bool>::describe().unwrap_err();
        assert_eq!(err.type_name, "Option<bool>");
    }

    #[test]
    fn record_builder_reports_first_unsupported_field() {
        let err = TypeDescriptor::record("Player")
            .field::<i64>("hp")
            .field::<Option<i64>>("mana")
            .field::<HashMap<u8, String>>("inventory")
            .build()
            .unwrap_err();
        assert_eq!(err.type_name, "Player");
        assert!(err.reason.contains("field `mana`"));
    }

    #[test]
    fn record_builder_rejects_duplicate_fields() {
        let err = TypeDescriptor::record("House")
            .field::<String>("color")
            .field::<i64>("color")
            .build()
            .unwrap_err();
        assert!(err.reason.contains("duplicate field"));
    }

    #[test]
    fn enumeration_rejects_duplicate_variants() {
        let err = TypeDescriptor::enumeration("Color", ["red", "red"]).unwrap_err();
        assert!(err.reason.contains("duplicate variant"));
        assert!(TypeDescriptor::enumeration("Color", ["red", "Red"]).is_ok());
    }
}
