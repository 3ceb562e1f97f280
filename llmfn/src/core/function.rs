//! Function declarations: signature, docstring and behavioral modifiers.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::core::types::{Describe, TypeDescriptor};
use crate::errors::UnsupportedTypeError;

/// Named behavioral modifier attached to a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flavor {
    /// Ask the model for genuine variation and raise sampling temperature.
    Random,
}

impl Flavor {
    pub fn as_str(self) -> &'static str {
        match self {
            Flavor::Random => "random",
        }
    }

    /// Extra instruction appended to the prompt.
    pub fn instruction(self) -> &'static str {
        match self {
            Flavor::Random => {
                "This function is non-deterministic. Do not give the most likely or \
                 most common answer: introduce genuine randomness and variety, as if \
                 sampling from every plausible output. Repeated calls with the same \
                 arguments should produce different results."
            }
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Flavor::Random),
            other => Err(format!("unknown flavor '{other}' (expected one of: random)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: TypeDescriptor,
}

/// A bodiless function: everything the pipeline knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    pub docstring: String,
    pub params: Vec<Param>,
    pub returns: TypeDescriptor,
    pub flavors: BTreeSet<Flavor>,
    pub debug: bool,
}

impl FunctionSpec {
    pub fn builder(name: &str) -> FunctionSpecBuilder {
        FunctionSpecBuilder::new(name)
    }

    pub fn has_flavor(&self, flavor: Flavor) -> bool {
        self.flavors.contains(&flavor)
    }

    /// `name(a: int, b: list[str]) -> House`
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({params}) -> {}", self.name, self.returns)
    }
}

/// Builder for [`FunctionSpec`]; the first unsupported type wins.
#[derive(Debug, Clone)]
pub struct FunctionSpecBuilder {
    name: String,
    docstring: String,
    params: Vec<Param>,
    returns: Option<TypeDescriptor>,
    flavors: BTreeSet<Flavor>,
    debug: bool,
    error: Option<UnsupportedTypeError>,
}

impl FunctionSpecBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            docstring: String::new(),
            params: Vec::new(),
            returns: None,
            flavors: BTreeSet::new(),
            debug: false,
            error: None,
        }
    }

    pub fn doc(mut self, docstring: &str) -> Self {
        self.docstring = docstring.trim().to_string();
        self
    }

    pub fn param<T: Describe>(self, name: &str) -> Self {
        match T::describe() {
            Ok(ty) => self.param_with(name, ty),
            Err(err) => self.fail(err),
        }
    }

    pub fn param_with(mut self, name: &str, ty: TypeDescriptor) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn returns<T: Describe>(self) -> Self {
        match T::describe() {
            Ok(ty) => self.returns_with(ty),
            Err(err) => self.fail(err),
        }
    }

    pub fn returns_with(mut self, ty: TypeDescriptor) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn flavor(mut self, flavor: Flavor) -> Self {
        self.flavors.insert(flavor);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn fail(mut self, err: UnsupportedTypeError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }

    pub fn build(self) -> Result<FunctionSpec, UnsupportedTypeError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let returns = self.returns.ok_or_else(|| {
            UnsupportedTypeError::new(
                format!("{}(...)", self.name),
                "declared function has no return type",
            )
        })?;
        let returns = returns.validated()?;
        let mut seen = BTreeSet::new();
        let mut params = Vec::with_capacity(self.params.len());
        for param in self.params {
            if !seen.insert(param.name.clone()) {
                return Err(UnsupportedTypeError::new(
                    format!("{}(...)", self.name),
                    format!("duplicate parameter '{}'", param.name),
                ));
            }
            params.push(Param {
                ty: param.ty.validated()?,
                name: param.name,
            });
        }
        Ok(FunctionSpec {
            name: self.name,
            docstring: self.docstring,
            params,
            returns,
            flavors: self.flavors,
            debug: self.debug,
        })
    }
}
