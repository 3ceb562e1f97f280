//! Wiring from [`LlmfnConfig`] to providers and pipelines, shared by the
//! `llmfn` and `eval` binaries.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::function::FunctionSpec;
use crate::core::prompt::PromptBuilder;
use crate::core::retry::RetryPolicy;
use crate::invoker::Invoker;
use crate::io::attempt_log::AttemptLogWriter;
use crate::io::codex::{CodexConfig, CodexProvider};
use crate::io::config::{LlmfnConfig, ProviderKind};
use crate::io::openai::{OpenAiConfig, OpenAiProvider};
use crate::io::provider::Provider;
use crate::pipeline::{CallPipeline, PipelineConfig};

/// Build the configured provider. The OpenAI key is read from
/// `provider.api_key_env`.
pub fn build_provider(cfg: &LlmfnConfig) -> Result<Arc<dyn Provider>> {
    debug!(kind = ?cfg.provider.kind, "building provider");
    match cfg.provider.kind {
        ProviderKind::Openai => {
            let api_key = std::env::var(&cfg.provider.api_key_env)
                .with_context(|| format!("read API key from ${}", cfg.provider.api_key_env))?;
            let provider = OpenAiProvider::new(OpenAiConfig {
                base_url: cfg.provider.base_url.clone(),
                api_key,
            })
            .context("create openai provider")?;
            Ok(Arc::new(provider))
        }
        ProviderKind::Codex => Ok(Arc::new(CodexProvider::new(CodexConfig {
            binary: cfg.provider.codex_binary.clone(),
            ..CodexConfig::default()
        }))),
    }
}

pub fn pipeline_config(cfg: &LlmfnConfig) -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy::new(cfg.max_attempts),
        prompts: PromptBuilder::new(cfg.prompt_budget_bytes),
        call_timeout: cfg.call_timeout(),
    }
}

/// Pipeline for `spec` on `provider`, with the attempt log attached when configured.
pub fn build_pipeline<P: Provider>(
    spec: &FunctionSpec,
    provider: P,
    cfg: &LlmfnConfig,
) -> Result<CallPipeline<P>> {
    let invoker = Invoker::new(provider, cfg.invoker.to_invoker_config());
    let mut pipeline = CallPipeline::new(spec.clone(), invoker, pipeline_config(cfg))
        .with_context(|| format!("prepare function '{}'", spec.name))?;
    if let Some(dir) = &cfg.invoker.attempt_log_dir {
        pipeline = pipeline.with_observer(Arc::new(AttemptLogWriter::new(dir)));
    }
    Ok(pipeline)
}
