mod cli;
mod config;
mod judge;
mod outcome;
mod report;
mod results;
mod run;
mod suite;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::run::RunOptions;

#[derive(Parser)]
#[command(name = "eval", version, about = "Evaluation harness for llmfn suites")]
struct Cli {
    /// Log progress to stderr (`RUST_LOG` overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    List,
    Run {
        suite_id: String,
        #[arg(long, default_value_t = 1)]
        runs: u32,
        /// Cases run concurrently.
        #[arg(long, default_value_t = 4)]
        jobs: usize,
        /// Config file; defaults to `llmfn.toml` in the repo root.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write every attempt under the run's results directory.
        #[arg(long)]
        debug: bool,
        /// Run only these case ids.
        #[arg(long = "case")]
        cases: Vec<String>,
    },
    Report {
        suite_id: String,
    },
    Clean {
        suite_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    llmfn::logging::init(cli.verbose);
    let repo_root = std::env::current_dir()?;
    match cli.command {
        Command::List => cli::list_suites(&repo_root),
        Command::Run {
            suite_id,
            runs,
            jobs,
            config,
            debug,
            cases,
        } => {
            let options = RunOptions {
                jobs,
                debug,
                only: cases,
            };
            cli::run_suite_by_id(&repo_root, &suite_id, runs, config.as_deref(), &options)
        }
        Command::Report { suite_id } => cli::report_suite(&repo_root, &suite_id),
        Command::Clean { suite_id } => cli::clean_suite(&repo_root, &suite_id),
    }
}
