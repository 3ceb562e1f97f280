//! `llmfn`: inspect and call functions declared in TOML declaration files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

use llmfn::core::schema::derive_schema;
use llmfn::errors::ProviderError;
use llmfn::exit_codes;
use llmfn::io::config::{CONFIG_FILE_NAME, LlmfnConfig, load_config};
use llmfn::io::declarations::load_declarations;
use llmfn::io::provider::{CompletionRequest, Provider, ProviderCapabilities};
use llmfn::setup::{build_pipeline, build_provider};

#[derive(Parser)]
#[command(name = "llmfn", version, about = "Typed functions answered by a language model")]
struct Cli {
    /// Log pipeline progress to stderr (`RUST_LOG` overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a declaration file and print every signature.
    Check {
        /// Declaration file (TOML).
        decl: PathBuf,
    },
    /// Print the return schema of a function.
    Schema {
        decl: PathBuf,
        function: String,
        /// Print parameter schemas too.
        #[arg(long)]
        params: bool,
    },
    /// Render the first-attempt prompt without calling a provider.
    Prompt {
        decl: PathBuf,
        function: String,
        /// Arguments as a JSON array, one element per parameter.
        #[arg(long, default_value = "[]")]
        args: String,
        /// Config file; defaults to `llmfn.toml` when present.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Call a function and print the decoded value as JSON.
    Call {
        decl: PathBuf,
        function: String,
        #[arg(long, default_value = "[]")]
        args: String,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Observe every attempt (prompt, response, decode outcome).
        #[arg(long)]
        debug: bool,
        /// Write attempts under this directory (implies --debug).
        #[arg(long)]
        attempt_log: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    llmfn::logging::init(cli.verbose);
    match run(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(command: Command) -> Result<i32> {
    match command {
        Command::Check { decl } => cmd_check(&decl),
        Command::Schema {
            decl,
            function,
            params,
        } => cmd_schema(&decl, &function, params),
        Command::Prompt {
            decl,
            function,
            args,
            config,
        } => cmd_prompt(&decl, &function, &args, config.as_deref()),
        Command::Call {
            decl,
            function,
            args,
            config,
            debug,
            attempt_log,
        } => {
            let mut cfg = load_cli_config(config.as_deref())?;
            if debug || attempt_log.is_some() {
                cfg.invoker.debug = true;
            }
            if attempt_log.is_some() {
                cfg.invoker.attempt_log_dir = attempt_log;
            }
            cmd_call(&decl, &function, &args, &cfg)
        }
    }
}

fn cmd_check(decl: &Path) -> Result<i32> {
    let decls = load_declarations(decl)?;
    for spec in &decls.functions {
        let flavors = spec
            .flavors
            .iter()
            .map(|f| format!(" [{f}]"))
            .collect::<String>();
        println!("{}{flavors}", spec.signature());
    }
    Ok(exit_codes::OK)
}

fn cmd_schema(decl: &Path, function: &str, params: bool) -> Result<i32> {
    let decls = load_declarations(decl)?;
    let spec = decls.require(function)?;
    if params {
        for param in &spec.params {
            println!("# {}: {}", param.name, param.ty);
            println!("{}", derive_schema(&param.ty).to_pretty());
        }
        println!("# returns: {}", spec.returns);
    }
    println!("{}", derive_schema(&spec.returns).to_pretty());
    Ok(exit_codes::OK)
}

fn cmd_prompt(decl: &Path, function: &str, args: &str, config: Option<&Path>) -> Result<i32> {
    let cfg = load_cli_config(config)?;
    let decls = load_declarations(decl)?;
    let spec = decls.require(function)?;
    let args = parse_args(args)?;
    // Rendering never reaches the provider.
    let pipeline = build_pipeline(spec, NoProvider, &cfg)?;
    let prompt = pipeline.render_prompt(&args)?;
    println!("{}", prompt.as_str());
    Ok(exit_codes::OK)
}

fn cmd_call(decl: &Path, function: &str, args: &str, cfg: &LlmfnConfig) -> Result<i32> {
    let decls = load_declarations(decl)?;
    let spec = decls.require(function)?;
    let args = parse_args(args)?;
    let provider = build_provider(cfg)?;
    let pipeline = build_pipeline(spec, provider, cfg)?;
    match pipeline.invoke(&args) {
        Ok(value) => {
            let rendered =
                serde_json::to_string_pretty(&value.to_json()).context("serialize result")?;
            println!("{rendered}");
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(exit_codes::for_call_error(&err))
        }
    }
}

fn load_cli_config(path: Option<&Path>) -> Result<LlmfnConfig> {
    match path {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            load_config(path)
        }
        None => load_config(Path::new(CONFIG_FILE_NAME)),
    }
}

fn parse_args(raw: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(raw).context("parse --args as JSON")?;
    match value {
        Value::Array(items) => Ok(items),
        other => bail!("--args must be a JSON array, got {other}"),
    }
}

/// Provider for commands that never send a request.
struct NoProvider;

impl Provider for NoProvider {
    fn name(&self) -> &str {
        "none"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
        Err(ProviderError::MalformedRequest(
            "no provider configured for this command".to_string(),
        ))
    }
}
