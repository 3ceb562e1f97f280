//! Textual type expressions used by declaration files.
//!
//! Grammar:
//!
//! ```text
//! type := "int" | "float" | "bool" | "str" | "string"
//!       | "list" "[" type "]"
//!       | "dict" "[" type "," type "]"
//!       | NAME            (a record or enum defined in the registry)
//! ```
//!
//! Resolution fails with [`UnsupportedTypeError`] for unknown names, malformed
//! expressions, non-string mapping keys and recursive definitions.

use std::collections::BTreeMap;

use crate::core::types::{EnumType, Field, PrimitiveKind, RecordType, TypeDescriptor};
use crate::errors::UnsupportedTypeError;

/// A named type definition before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDef {
    /// Ordered `(field name, type expression)` pairs.
    Record { fields: Vec<(String, String)> },
    Enum { variants: Vec<String> },
}

/// Named record/enum definitions that expressions can refer to.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    defs: BTreeMap<String, TypeDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &str, def: TypeDef) -> Result<(), UnsupportedTypeError> {
        if builtin(name).is_some() || matches!(name, "list" | "dict") {
            return Err(UnsupportedTypeError::new(
                name,
                "builtin type names cannot be redefined",
            ));
        }
        if !is_identifier(name) {
            return Err(UnsupportedTypeError::new(name, "type names must be identifiers"));
        }
        if self.defs.insert(name.to_string(), def).is_some() {
            return Err(UnsupportedTypeError::new(name, "type is defined twice"));
        }
        Ok(())
    }

    /// Resolve an expression to a validated descriptor.
    pub fn resolve(&self, expr: &str) -> Result<TypeDescriptor, UnsupportedTypeError> {
        let parsed = Parser::new(expr).parse_all()?;
        self.resolve_expr(&parsed, &mut Vec::new())?.validated()
    }

    fn resolve_expr(
        &self,
        expr: &Expr,
        visiting: &mut Vec<String>,
    ) -> Result<TypeDescriptor, UnsupportedTypeError> {
        match expr {
            Expr::Name(name) => {
                if let Some(kind) = builtin(name) {
                    return Ok(TypeDescriptor::Primitive(kind));
                }
                self.resolve_named(name, visiting)
            }
            Expr::List(element) => Ok(TypeDescriptor::list(self.resolve_expr(element, visiting)?)),
            Expr::Dict(key, value) => {
                let key_ty = self.resolve_expr(key, visiting)?;
                if key_ty != TypeDescriptor::string() {
                    return Err(UnsupportedTypeError::new(
                        expr.to_string(),
                        "mapping keys must be strings",
                    ));
                }
                Ok(TypeDescriptor::mapping(self.resolve_expr(value, visiting)?))
            }
        }
    }

    fn resolve_named(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
    ) -> Result<TypeDescriptor, UnsupportedTypeError> {
        let def = self
            .defs
            .get(name)
            .ok_or_else(|| UnsupportedTypeError::new(name, "no such type is defined"))?;
        if visiting.iter().any(|v| v == name) {
            let cycle = visiting
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(name))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(UnsupportedTypeError::new(
                name,
                format!("recursive type definitions are not supported ({cycle})"),
            ));
        }
        match def {
            TypeDef::Enum { variants } => Ok(TypeDescriptor::Enum(EnumType {
                name: name.to_string(),
                variants: variants.clone(),
            })),
            TypeDef::Record { fields } => {
                visiting.push(name.to_string());
                let mut resolved = Vec::with_capacity(fields.len());
                for (field, field_expr) in fields {
                    let parsed = Parser::new(field_expr).parse_all().map_err(|err| {
                        UnsupportedTypeError::new(name, format!("field `{field}`: {err}"))
                    })?;
                    resolved.push(Field {
                        name: field.clone(),
                        ty: self.resolve_expr(&parsed, visiting)?,
                    });
                }
                visiting.pop();
                Ok(TypeDescriptor::Record(RecordType {
                    name: name.to_string(),
                    fields: resolved,
                }))
            }
        }
    }
}

fn builtin(name: &str) -> Option<PrimitiveKind> {
    match name {
        "int" => Some(PrimitiveKind::Int),
        "float" => Some(PrimitiveKind::Float),
        "bool" => Some(PrimitiveKind::Bool),
        "str" | "string" => Some(PrimitiveKind::String),
        _ => None,
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Name(String),
    List(Box<Expr>),
    Dict(Box<Expr>, Box<Expr>),
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Name(name) => f.write_str(name),
            Expr::List(element) => write!(f, "list[{element}]"),
            Expr::Dict(key, value) => write!(f, "dict[{key}, {value}]"),
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn parse_all(mut self) -> Result<Expr, UnsupportedTypeError> {
        let expr = self.parse_type()?;
        self.skip_ws();
        if self.pos != self.src.len() {
            return Err(self.error(&format!("unexpected `{}`", &self.src[self.pos..])));
        }
        Ok(expr)
    }

    fn parse_type(&mut self) -> Result<Expr, UnsupportedTypeError> {
        let name = self.ident()?;
        match name.as_str() {
            "list" => {
                self.expect('[')?;
                let element = self.parse_type()?;
                self.expect(']')?;
                Ok(Expr::List(Box::new(element)))
            }
            "dict" => {
                self.expect('[')?;
                let key = self.parse_type()?;
                self.expect(',')?;
                let value = self.parse_type()?;
                self.expect(']')?;
                Ok(Expr::Dict(Box::new(key), Box::new(value)))
            }
            _ => Ok(Expr::Name(name)),
        }
    }

    fn ident(&mut self) -> Result<String, UnsupportedTypeError> {
        self.skip_ws();
        let rest = &self.src[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a type name"));
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    fn expect(&mut self, ch: char) -> Result<(), UnsupportedTypeError> {
        self.skip_ws();
        if self.src[self.pos..].starts_with(ch) {
            self.pos += ch.len_utf8();
            return Ok(());
        }
        Err(self.error(&format!("expected `{ch}`")))
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self, reason: &str) -> UnsupportedTypeError {
        UnsupportedTypeError::new(
            self.src.trim(),
            format!("{reason} at offset {}", self.pos),
        )
    }
}
