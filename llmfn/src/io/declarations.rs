//! TOML declaration files: named types plus bodiless functions.
//!
//! ```toml
//! [types.House]
//! kind = "record"
//! fields = [
//!     { name = "color", type = "str" },
//!     { name = "size", type = "int" },
//! ]
//!
//! [types.Color]
//! kind = "enum"
//! variants = ["lavender", "indigo", "terracotta"]
//!
//! [[functions]]
//! name = "guess_letter"
//! doc = "Check if the letter is in the word."
//! params = [{ name = "word", type = "str" }, { name = "letter", type = "str" }]
//! returns = "bool"
//! flavors = []
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::function::{Flavor, FunctionSpec};
use crate::core::type_expr::{TypeDef, TypeRegistry, is_identifier};

/// Raw file contents, before type resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeclarationFile {
    #[serde(default)]
    pub types: BTreeMap<String, TypeDecl>,
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDecl {
    Record { fields: Vec<FieldDecl> },
    Enum { variants: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub params: Vec<FieldDecl>,
    pub returns: String,
    #[serde(default)]
    pub flavors: Vec<String>,
    #[serde(default)]
    pub debug: bool,
}

/// Resolved declarations, ready to build pipelines from.
#[derive(Debug, Clone)]
pub struct Declarations {
    pub registry: TypeRegistry,
    pub functions: Vec<FunctionSpec>,
}

impl Declarations {
    pub fn function(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Like [`Declarations::function`], listing known names on a miss.
    pub fn require(&self, name: &str) -> Result<&FunctionSpec> {
        self.function(name).ok_or_else(|| {
            let known = self
                .functions
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            anyhow!("no function named '{name}' (declared: {known})")
        })
    }
}

impl DeclarationFile {
    /// Resolve every type expression and build the function specs.
    pub fn resolve(&self) -> Result<Declarations> {
        let mut registry = TypeRegistry::new();
        for (name, decl) in &self.types {
            let def = match decl {
                TypeDecl::Record { fields } => TypeDef::Record {
                    fields: fields
                        .iter()
                        .map(|f| (f.name.clone(), f.ty.clone()))
                        .collect(),
                },
                TypeDecl::Enum { variants } => TypeDef::Enum {
                    variants: variants.clone(),
                },
            };
            registry
                .define(name, def)
                .with_context(|| format!("type '{name}'"))?;
        }
        // Surface bad type definitions even when no function uses them.
        for name in self.types.keys() {
            registry
                .resolve(name)
                .with_context(|| format!("type '{name}'"))?;
        }

        let mut seen = BTreeSet::new();
        let mut functions = Vec::with_capacity(self.functions.len());
        for decl in &self.functions {
            if !seen.insert(decl.name.as_str()) {
                return Err(anyhow!("function '{}' is declared twice", decl.name));
            }
            let spec = resolve_function(&registry, decl)
                .with_context(|| format!("function '{}'", decl.name))?;
            functions.push(spec);
        }
        debug!(
            types = self.types.len(),
            functions = functions.len(),
            "resolved declarations"
        );
        Ok(Declarations {
            registry,
            functions,
        })
    }
}

fn resolve_function(registry: &TypeRegistry, decl: &FunctionDecl) -> Result<FunctionSpec> {
    if !is_identifier(&decl.name) {
        return Err(anyhow!("function names must be identifiers"));
    }
    let mut builder = FunctionSpec::builder(&decl.name)
        .doc(&decl.doc)
        .debug(decl.debug);
    for param in &decl.params {
        let ty = registry
            .resolve(&param.ty)
            .with_context(|| format!("parameter '{}'", param.name))?;
        builder = builder.param_with(&param.name, ty);
    }
    let returns = registry.resolve(&decl.returns).context("return type")?;
    builder = builder.returns_with(returns);
    for flavor in &decl.flavors {
        let flavor: Flavor = flavor.parse().map_err(|err: String| anyhow!(err))?;
        builder = builder.flavor(flavor);
    }
    Ok(builder.build()?)
}

/// Parse and resolve declaration TOML.
pub fn parse_declarations(src: &str) -> Result<Declarations> {
    let file: DeclarationFile = toml::from_str(src).context("parse declarations toml")?;
    file.resolve()
}

/// Load and resolve a declaration file.
pub fn load_declarations(path: &Path) -> Result<Declarations> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_declarations(&contents).with_context(|| format!("load {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TypeDescriptor;
    use crate::test_support::{color, person};

    const SAMPLE: &str = r#"
[types.House]
kind = "record"
fields = [
    { name = "color", type = "str" },
    { name = "size", type = "int" },
    { name = "is_occupied", type = "bool" },
]

[types.Person]
kind = "record"
fields = [
    { name = "name", type = "str" },
    { name = "age", type = "int" },
    { name = "city", type = "str" },
    { name = "home", type = "House" },
]

[types.Color]
kind = "enum"
variants = ["lavender", "indigo", "terracotta"]

[[functions]]
name = "nested_dataclass"
returns = "Person"

[[functions]]
name = "enum"
returns = "Color"

[[functions]]
name = "choose_words"
doc = "Choose n random words."
params = [{ name = "n", type = "int" }]
returns = "list[str]"
flavors = ["random"]
debug = true
"#;

    #[test]
    fn resolves_sample_declarations() {
        let decls = parse_declarations(SAMPLE).expect("declarations");
        assert_eq!(decls.functions.len(), 3);
        assert_eq!(decls.require("nested_dataclass").unwrap().returns, person());
        assert_eq!(decls.require("enum").unwrap().returns, color());

        let choose = decls.require("choose_words").unwrap();
        assert_eq!(choose.signature(), "choose_words(n: int) -> list[str]");
        assert!(choose.has_flavor(Flavor::Random));
        assert!(choose.debug);
        assert_eq!(
            choose.returns,
            TypeDescriptor::list(TypeDescriptor::string())
        );
    }

    #[test]
    fn unknown_function_lists_declared_names() {
        let decls = parse_declarations(SAMPLE).expect("declarations");
        let err = decls.require("cook").unwrap_err();
        assert!(err.to_string().contains("nested_dataclass, enum, choose_words"));
    }

    #[test]
    fn unknown_flavor_is_rejected() {
        let src = r#"
[[functions]]
name = "f"
returns = "int"
flavors = ["spicy"]
"#;
        let err = parse_declarations(src).unwrap_err();
        assert!(format!("{err:#}").contains("unknown flavor 'spicy'"));
    }

    #[test]
    fn unused_bad_types_are_rejected() {
        let src = r#"
[types.Empty]
kind = "enum"
variants = []
"#;
        let err = parse_declarations(src).unwrap_err();
        assert!(format!("{err:#}").contains("type 'Empty'"));
    }

    #[test]
    fn unknown_parameter_type_names_the_parameter() {
        let src = r#"
[[functions]]
name = "receive_attack"
params = [{ name = "player_state", type = "Player" }]
returns = "Player"
"#;
        let err = parse_declarations(src).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("function 'receive_attack'"));
        assert!(msg.contains("parameter 'player_state'"));
    }

    #[test]
    fn duplicate_functions_are_rejected() {
        let src = r#"
[[functions]]
name = "f"
returns = "int"

[[functions]]
name = "f"
returns = "str"
"#;
        assert!(parse_declarations(src).is_err());
    }

    #[test]
    fn loads_from_disk_with_path_context() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("fns.toml");
        fs::write(&path, SAMPLE).expect("write");
        assert!(load_declarations(&path).is_ok());
        let err = load_declarations(&temp.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
