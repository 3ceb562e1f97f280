//! `llmfn.toml` configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::prompt::DEFAULT_PROMPT_BUDGET_BYTES;
use crate::core::retry::DEFAULT_MAX_ATTEMPTS;
use crate::invoker::{InvokerConfig, OutputMode};

/// Configuration file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "llmfn.toml";

/// Top-level configuration (TOML). Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmfnConfig {
    /// Provider invocations allowed per call, retries included.
    pub max_attempts: u32,

    pub prompt_budget_bytes: usize,

    /// Wall-clock budget for a whole call, retries included. `0` disables it.
    pub call_timeout_secs: u64,

    pub invoker: InvokerSection,
    pub provider: ProviderSection,
}

impl Default for LlmfnConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            prompt_budget_bytes: DEFAULT_PROMPT_BUDGET_BYTES,
            call_timeout_secs: 0,
            invoker: InvokerSection::default(),
            provider: ProviderSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InvokerSection {
    pub model: String,
    /// Sampling temperature; provider default when unset.
    pub temperature: Option<f32>,
    /// Temperature used for functions with the `random` flavor.
    pub random_temperature: f32,
    pub output_mode: OutputMode,
    pub request_timeout_secs: u64,
    pub debug: bool,
    /// Write every attempt under this directory when debugging.
    pub attempt_log_dir: Option<PathBuf>,
}

impl Default for InvokerSection {
    fn default() -> Self {
        let defaults = InvokerConfig::default();
        Self {
            model: defaults.model,
            temperature: defaults.temperature,
            random_temperature: defaults.random_temperature,
            output_mode: defaults.output_mode,
            request_timeout_secs: defaults.request_timeout.as_secs(),
            debug: defaults.debug,
            attempt_log_dir: None,
        }
    }
}

impl InvokerSection {
    pub fn to_invoker_config(&self) -> InvokerConfig {
        InvokerConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            random_temperature: self.random_temperature,
            output_mode: self.output_mode,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            debug: self.debug,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Openai,
    Codex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderSection {
    pub kind: ProviderKind,
    /// OpenAI-compatible base URL.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// `codex` executable.
    pub codex_binary: PathBuf,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Openai,
            base_url: crate::io::openai::DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            codex_binary: PathBuf::from("codex"),
        }
    }
}

impl LlmfnConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.invoker.model.trim().is_empty() && self.provider.kind == ProviderKind::Openai {
            return Err(anyhow!("invoker.model must be set for the openai provider"));
        }
        if self.invoker.request_timeout_secs == 0 {
            return Err(anyhow!("invoker.request_timeout_secs must be > 0"));
        }
        for (name, value) in [
            ("invoker.temperature", self.invoker.temperature),
            ("invoker.random_temperature", Some(self.invoker.random_temperature)),
        ] {
            if let Some(t) = value
                && !(0.0..=2.0).contains(&t)
            {
                return Err(anyhow!("{name} must be within 0.0..=2.0, got {t}"));
            }
        }
        if self.provider.kind == ProviderKind::Openai {
            if self.provider.base_url.trim().is_empty() {
                return Err(anyhow!("provider.base_url must be set"));
            }
            if self.provider.api_key_env.trim().is_empty() {
                return Err(anyhow!("provider.api_key_env must be set"));
            }
        }
        Ok(())
    }

    /// Per-call deadline budget, if enabled.
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs))
    }
}

/// Load config from a TOML file; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<LlmfnConfig> {
    if !path.exists() {
        let cfg = LlmfnConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LlmfnConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LlmfnConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
