//! Suite execution orchestration.
//!
//! Builds one pipeline per case on a shared provider, runs cases on a bounded
//! pool of worker threads, judges each result and captures the run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use llmfn::core::value::DecodedValue;
use llmfn::errors::ProviderError;
use llmfn::io::config::LlmfnConfig;
use llmfn::io::provider::{CompletionRequest, Provider, ProviderCapabilities};
use llmfn::pipeline::run_ordered;
use llmfn::setup::build_pipeline;

use crate::config::apply_suite_config;
use crate::judge::run_checks;
use crate::outcome::{Outcome, classify_outcome};
use crate::results::{CaptureInput, CaseResult, OutcomeCounts, capture_results, results_dir};
use crate::suite::{Case, Suite};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Cases run concurrently.
    pub jobs: usize,
    /// Write every attempt under `<results>/attempts/<case>/`.
    pub debug: bool,
    /// Case ids to run; empty runs all.
    pub only: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            debug: false,
            only: Vec::new(),
        }
    }
}

/// Result of running a suite once.
#[derive(Debug)]
pub struct RunOutcome {
    /// Unique identifier for this eval run.
    pub eval_run_id: String,
    /// Path to the results directory.
    pub results_dir: PathBuf,
    pub counts: OutcomeCounts,
}

/// Run every selected case of a suite and capture the results.
#[instrument(skip_all, fields(suite_id = %suite.id()))]
pub fn run_suite(
    repo_root: &Path,
    suite_path: &Path,
    suite: &Suite,
    base_config: &LlmfnConfig,
    provider: &dyn Provider,
    options: &RunOptions,
) -> Result<RunOutcome> {
    info!("suite run started");
    let cfg = apply_suite_config(base_config.clone(), &suite.file.config)
        .context("apply suite config")?;

    let cases = select_cases(suite, &options.only)?;
    let started_at = Utc::now();
    let eval_run_id = format!("eval-{}", started_at.format("%Y%m%d_%H%M%S_%3f"));
    let run_dir = results_dir(&repo_root.join("eval").join("results"), suite.id(), &eval_run_id);

    let jobs = options.jobs.clamp(1, cases.len().max(1));
    debug!(cases = cases.len(), jobs, "running cases");
    let results: Vec<CaseResult> = run_ordered(&cases, jobs, |case| {
        let attempt_log = options
            .debug
            .then(|| run_dir.join("attempts").join(case.id()));
        run_case(suite, case, provider, &cfg, attempt_log)
    });
    let finished_at = Utc::now();

    let input = CaptureInput {
        suite_id: suite.id(),
        suite_path,
        eval_run_id: &eval_run_id,
        config: &cfg,
        provider: provider.name(),
        jobs,
        started_at,
        finished_at,
        repo_root,
        cases: &results,
    };
    let meta = capture_results(&run_dir, &input).context("capture results")?;
    info!(
        success = meta.counts.success,
        total = meta.counts.total(),
        results_dir = %run_dir.display(),
        "suite run complete"
    );

    Ok(RunOutcome {
        eval_run_id,
        results_dir: run_dir,
        counts: meta.counts,
    })
}

fn select_cases<'a>(suite: &'a Suite, only: &[String]) -> Result<Vec<&'a Case>> {
    if only.is_empty() {
        return Ok(suite.cases().iter().collect());
    }
    let mut selected = Vec::with_capacity(only.len());
    for id in only {
        let Some(case) = suite.cases().iter().find(|case| case.id() == id) else {
            bail!("suite {} has no case {id}", suite.id());
        };
        selected.push(case);
    }
    Ok(selected)
}

/// Call one case and judge its result. Failures become outcomes, never errors.
#[instrument(skip_all, fields(case = %case.id()))]
fn run_case(
    suite: &Suite,
    case: &Case,
    provider: &dyn Provider,
    base: &LlmfnConfig,
    attempt_log: Option<PathBuf>,
) -> CaseResult {
    let started = Instant::now();
    let mut cfg = base.clone();
    if let Some(dir) = attempt_log {
        cfg.invoker.debug = true;
        cfg.invoker.attempt_log_dir = Some(dir);
    }

    let pipeline = suite
        .declarations
        .require(&case.function)
        .and_then(|spec| build_pipeline(spec, CountingProvider::new(provider), &cfg));
    let pipeline = match pipeline {
        Ok(pipeline) => pipeline,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "case could not be prepared");
            return CaseResult {
                id: case.id().to_string(),
                function: case.function.clone(),
                outcome: Outcome::Invalid,
                attempts: 0,
                duration_secs: started.elapsed().as_secs_f64(),
                value: None,
                error: Some(format!("{err:#}")),
                checks: run_checks(&case.checks, None),
            };
        }
    };

    let result = pipeline.invoke(&case.args);
    let value = result.as_ref().ok().map(DecodedValue::to_json);
    let checks = run_checks(&case.checks, value.as_ref());
    let outcome = classify_outcome(result.as_ref().err(), &checks);
    let attempts = pipeline.invoker().provider().calls();
    debug!(?outcome, attempts, "case finished");

    CaseResult {
        id: case.id().to_string(),
        function: case.function.clone(),
        outcome,
        attempts,
        duration_secs: started.elapsed().as_secs_f64(),
        value,
        error: result.err().map(|err| err.to_string()),
        checks,
    }
}

/// Provider wrapper counting the requests of one case.
struct CountingProvider<'a> {
    inner: &'a dyn Provider,
    calls: AtomicU32,
}

impl<'a> CountingProvider<'a> {
    fn new(inner: &'a dyn Provider) -> Self {
        Self {
            inner,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Provider for CountingProvider<'_> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.inner.capabilities()
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.complete(request)
    }
}
