//! Configuration merging.
//!
//! Applies suite-specific overrides to the base `llmfn.toml` configuration.

use anyhow::Result;
use llmfn::io::config::LlmfnConfig;

use crate::suite::SuiteConfig;

/// Apply suite configuration overrides to the base config.
pub fn apply_suite_config(mut base: LlmfnConfig, overrides: &SuiteConfig) -> Result<LlmfnConfig> {
    if let Some(max_attempts) = overrides.max_attempts {
        base.max_attempts = max_attempts;
    }
    if let Some(model) = &overrides.model {
        base.invoker.model = model.clone();
    }
    if let Some(output_mode) = overrides.output_mode {
        base.invoker.output_mode = output_mode;
    }
    base.validate()?;
    Ok(base)
}
