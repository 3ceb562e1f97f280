//! Suite file parsing and validation.
//!
//! A suite is a declaration file (types and functions, see
//! [`llmfn::io::declarations`]) plus a `[suite]` header, optional config
//! overrides and the `[[cases]]` to call. See `eval/suites/` for examples.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::Value;

use llmfn::invoker::OutputMode;
use llmfn::io::declarations::{DeclarationFile, Declarations};

use crate::judge::Check;

/// A parsed suite file with its declarations resolved.
#[derive(Debug, Clone)]
pub struct Suite {
    pub file: SuiteFile,
    pub declarations: Declarations,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SuiteFile {
    pub suite: SuiteMeta,
    #[serde(default)]
    pub config: SuiteConfig,
    #[serde(flatten)]
    pub declarations: DeclarationFile,
    #[serde(default)]
    pub cases: Vec<Case>,
}

/// Suite metadata: identifier and description.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SuiteMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    #[serde(default)]
    pub description: String,
}

/// Overrides applied on top of `llmfn.toml` for this suite.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SuiteConfig {
    pub max_attempts: Option<u32>,
    pub model: Option<String>,
    pub output_mode: Option<OutputMode>,
}

/// One call of a declared function and the checks its result must pass.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Case {
    /// Defaults to the function name.
    pub id: Option<String>,
    pub function: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl Case {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.function)
    }
}

impl Suite {
    /// Load, resolve and validate a suite file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read suite {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("load suite {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let file: SuiteFile = toml::from_str(contents).context("parse suite")?;
        let declarations = file.declarations.resolve()?;
        let suite = Suite { file, declarations };
        suite.validate()?;
        Ok(suite)
    }

    pub fn id(&self) -> &str {
        &self.file.suite.id
    }

    pub fn cases(&self) -> &[Case] {
        &self.file.cases
    }

    fn validate(&self) -> Result<()> {
        validate_suite_id(&self.file.suite.id)?;
        if let Some(0) = self.file.config.max_attempts {
            bail!("config.max_attempts must be > 0");
        }
        if self.file.cases.is_empty() {
            bail!("cases must be a non-empty array");
        }
        let mut seen = BTreeSet::new();
        for (index, case) in self.file.cases.iter().enumerate() {
            if !seen.insert(case.id()) {
                bail!("cases[{index}]: duplicate case id {}", case.id());
            }
            let spec = self
                .declarations
                .require(&case.function)
                .with_context(|| format!("cases[{index}]"))?;
            if case.args.len() != spec.params.len() {
                bail!(
                    "cases[{index}]: {} takes {} argument(s), case gives {}",
                    spec.name,
                    spec.params.len(),
                    case.args.len()
                );
            }
            for check in &case.checks {
                check
                    .validate()
                    .with_context(|| format!("cases[{index}] checks invalid"))?;
            }
        }
        Ok(())
    }
}

/// Discover and load all suite files from a directory.
///
/// Returns suites sorted by id. Errors if duplicate ids are found.
pub fn discover_suites(dir: &Path) -> Result<Vec<Suite>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut suites = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read suites dir {}", dir.display()))? {
        let entry = entry.context("read suite entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        suites.push(Suite::load(&path)?);
    }
    suites.sort_by(|left, right| left.id().cmp(right.id()));
    for pair in suites.windows(2) {
        if pair[0].id() == pair[1].id() {
            return Err(anyhow!("duplicate suite.id {}", pair[0].id()));
        }
    }
    Ok(suites)
}

fn validate_suite_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("suite.id must be non-empty");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("suite.id must use [a-z0-9_-] only");
    }
    Ok(())
}
