//! Provider backed by the `codex exec` CLI.
//!
//! The prompt is fed on stdin, the return schema (if any) is written to a temp
//! file for `--output-schema`, and the completion is read back from
//! `--output-last-message`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, instrument, warn};

use crate::errors::ProviderError;
use crate::io::process::run_command_with_timeout;
use crate::io::provider::{CompletionRequest, Provider, ProviderCapabilities, ResponseFormat};

/// Stderr bytes quoted in failure messages.
const STDERR_TAIL_BYTES: usize = 2_000;

#[derive(Debug, Clone)]
pub struct CodexConfig {
    /// Executable to run (`codex` on `PATH` by default).
    pub binary: PathBuf,
    /// Working directory; a fresh temp dir when `None`.
    pub workdir: Option<PathBuf>,
    /// Cap on captured stdout/stderr.
    pub output_limit_bytes: usize,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("codex"),
            workdir: None,
            output_limit_bytes: 100_000,
        }
    }
}

pub struct CodexProvider {
    config: CodexConfig,
}

impl CodexProvider {
    pub fn new(config: CodexConfig) -> Self {
        Self { config }
    }
}

fn codex_args(model: &str, schema_path: Option<&Path>, output_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "exec".into(),
        "--skip-git-repo-check".into(),
        "--sandbox".into(),
        "read-only".into(),
    ];
    if !model.is_empty() {
        args.push("--model".into());
        args.push(model.into());
    }
    if let Some(path) = schema_path {
        args.push("--output-schema".into());
        args.push(path.into());
    }
    args.push("--output-last-message".into());
    args.push(output_path.into());
    args.push("-".into());
    args
}

fn transport(context: &str, err: impl std::fmt::Display) -> ProviderError {
    ProviderError::Transport(format!("{context}: {err:#}"))
}

impl Provider for CodexProvider {
    fn name(&self) -> &str {
        "codex"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            json_object: false,
            json_schema: true,
        }
    }

    #[instrument(skip_all, fields(model = %request.model, timeout_ms = request.timeout.as_millis() as u64))]
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let scratch = tempfile::tempdir().map_err(|err| transport("create scratch dir", err))?;
        let schema_path = match &request.response_format {
            ResponseFormat::JsonSchema { schema, .. } => {
                let path = scratch.path().join("output_schema.json");
                let body = serde_json::to_string_pretty(schema)
                    .map_err(|err| ProviderError::MalformedRequest(err.to_string()))?;
                fs::write(&path, body).map_err(|err| transport("write output schema", err))?;
                Some(path)
            }
            ResponseFormat::Text | ResponseFormat::JsonObject => None,
        };
        let output_path = scratch.path().join("last_message.txt");

        let mut cmd = Command::new(&self.config.binary);
        cmd.args(codex_args(&request.model, schema_path.as_deref(), &output_path))
            .current_dir(self.config.workdir.as_deref().unwrap_or(scratch.path()));

        info!(binary = %self.config.binary.display(), "starting codex exec");
        let output = run_command_with_timeout(
            cmd,
            Some(request.flattened_prompt().into_bytes()),
            request.timeout,
            self.config.output_limit_bytes,
        )
        .map_err(|err| transport("run codex exec", err))?;

        if output.timed_out {
            warn!("codex exec timed out");
            return Err(ProviderError::Timeout(request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "codex exec failed");
            return Err(ProviderError::Transport(format!(
                "codex exec exited with status {:?}: {}",
                output.status.code(),
                output.stderr_tail(STDERR_TAIL_BYTES)
            )));
        }

        let content = fs::read_to_string(&output_path).map_err(|err| {
            ProviderError::MalformedResponse(format!("codex wrote no last message: {err}"))
        })?;
        debug!(bytes = content.len(), "codex exec completed");
        Ok(content)
    }
}
