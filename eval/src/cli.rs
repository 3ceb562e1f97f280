//! CLI command implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use llmfn::io::config::{CONFIG_FILE_NAME, load_config};
use llmfn::setup::build_provider;

use crate::report::aggregate;
use crate::run::{RunOptions, run_suite};
use crate::suite::{Suite, discover_suites};

fn suites_dir(repo_root: &Path) -> PathBuf {
    repo_root.join("eval").join("suites")
}

fn results_dir(repo_root: &Path) -> PathBuf {
    repo_root.join("eval").join("results")
}

/// List all available suites and their cases.
pub fn list_suites(repo_root: &Path) -> Result<()> {
    for suite in discover_suites(&suites_dir(repo_root))? {
        println!(
            "{} ({} cases) {}",
            suite.id(),
            suite.cases().len(),
            suite.file.suite.description
        );
        for case in suite.cases() {
            println!("  {}: {}", case.id(), case.function);
        }
    }
    Ok(())
}

/// Run a suite by id (optionally multiple times).
pub fn run_suite_by_id(
    repo_root: &Path,
    suite_id: &str,
    runs: u32,
    config: Option<&Path>,
    options: &RunOptions,
) -> Result<()> {
    let suite_path = suites_dir(repo_root).join(format!("{suite_id}.toml"));
    if !suite_path.exists() {
        bail!("suite {} not found at {}", suite_id, suite_path.display());
    }
    let suite = Suite::load(&suite_path).context("load suite")?;
    let config_path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| repo_root.join(CONFIG_FILE_NAME));
    let cfg = load_config(&config_path)?;
    let provider = build_provider(&cfg)?;
    debug!(suite_id, runs, provider = provider.name(), "suite loaded");

    info!(suite_id, runs, "starting runs");
    for run_num in 1..=runs {
        debug!(suite_id, run_num, runs, "starting run");
        let outcome = run_suite(
            repo_root,
            &suite_path,
            &suite,
            &cfg,
            provider.as_ref(),
            options,
        )
        .context("run suite")?;
        println!(
            "run: suite={} eval_run_id={} success={}/{} results={}",
            suite_id,
            outcome.eval_run_id,
            outcome.counts.success,
            outcome.counts.total(),
            outcome.results_dir.display()
        );
    }
    Ok(())
}

/// Show aggregated results for a suite.
pub fn report_suite(repo_root: &Path, suite_id: &str) -> Result<()> {
    let (summary, warnings) = aggregate(&results_dir(repo_root).join(suite_id))?;
    let counts = summary.counts;
    println!("report: suite={} runs={}", suite_id, summary.runs);
    println!(
        "report: success={} fail={} exhausted={} provider_error={} invalid={}",
        counts.success, counts.fail, counts.exhausted, counts.provider_error, counts.invalid
    );
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={avg:.2}");
    }
    if let Some(avg) = summary.avg_attempts {
        println!("report: avg_attempts={avg:.2}");
    }
    for (case, (passed, total)) in summary.case_success_rates {
        println!("report: case {case} {passed}/{total}");
    }
    for (label, (passed, total)) in summary.check_pass_rates {
        println!("report: check {label} {passed}/{total}");
    }
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

/// Remove results for a suite.
pub fn clean_suite(repo_root: &Path, suite_id: &str) -> Result<()> {
    let suite_results = results_dir(repo_root).join(suite_id);
    if suite_results.exists() {
        std::fs::remove_dir_all(&suite_results)
            .with_context(|| format!("remove {}", suite_results.display()))?;
    }
    println!(
        "clean: suite={} results={}",
        suite_id,
        suite_results.display()
    );
    Ok(())
}
