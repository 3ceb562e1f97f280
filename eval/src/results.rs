//! Result capture and persistence.
//!
//! Each run writes `meta.json` (suite hash, timing, outcome counts),
//! `cases.json` (one [`CaseResult`] per case) and the effective `llmfn.toml`
//! to `eval/results/<suite>/<eval_run_id>/` for later analysis.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use llmfn::io::config::{LlmfnConfig, write_config};

use crate::judge::CheckOutcome;
use crate::outcome::Outcome;

/// Result of one case in one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseResult {
    pub id: String,
    pub function: String,
    pub outcome: Outcome,
    /// Provider invocations made, retries included.
    pub attempts: u32,
    pub duration_secs: f64,
    /// Decoded value as JSON, when the call succeeded.
    pub value: Option<Value>,
    pub error: Option<String>,
    pub checks: Vec<CheckOutcome>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub success: usize,
    pub fail: usize,
    pub exhausted: usize,
    pub provider_error: usize,
    pub invalid: usize,
}

impl OutcomeCounts {
    pub fn from_results(results: &[CaseResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            counts.record(result.outcome);
        }
        counts
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Fail => self.fail += 1,
            Outcome::Exhausted => self.exhausted += 1,
            Outcome::ProviderError => self.provider_error += 1,
            Outcome::Invalid => self.invalid += 1,
        }
    }

    pub fn add(&mut self, other: &OutcomeCounts) {
        self.success += other.success;
        self.fail += other.fail;
        self.exhausted += other.exhausted;
        self.provider_error += other.provider_error;
        self.invalid += other.invalid;
    }

    pub fn total(&self) -> usize {
        self.success + self.fail + self.exhausted + self.provider_error + self.invalid
    }
}

/// Metadata for an eval run, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvalMeta {
    pub suite_id: String,
    pub eval_run_id: String,
    /// SHA-256 hash of the suite file for reproducibility tracking.
    pub suite_hash: String,
    /// Git SHA of the repo at time of run.
    pub git_sha: Option<String>,
    pub provider: String,
    pub model: String,
    pub max_attempts: u32,
    pub jobs: usize,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub counts: OutcomeCounts,
    /// Non-fatal errors encountered during capture.
    pub errors: Vec<String>,
}

/// Input for capturing results from a completed run.
#[derive(Debug)]
pub struct CaptureInput<'a> {
    pub suite_id: &'a str,
    pub suite_path: &'a Path,
    pub eval_run_id: &'a str,
    pub config: &'a LlmfnConfig,
    pub provider: &'a str,
    pub jobs: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub repo_root: &'a Path,
    pub cases: &'a [CaseResult],
}

/// Write `meta.json`, `cases.json` and `llmfn.toml` into `results_dir`.
#[instrument(skip_all, fields(suite_id = %input.suite_id, eval_run_id = %input.eval_run_id))]
pub fn capture_results(results_dir: &Path, input: &CaptureInput<'_>) -> Result<EvalMeta> {
    fs::create_dir_all(results_dir)
        .with_context(|| format!("create results dir {}", results_dir.display()))?;

    let mut errors = Vec::new();

    let suite_hash = match file_sha256(input.suite_path) {
        Ok(hash) => hash,
        Err(err) => {
            errors.push(format!("suite hash: {err}"));
            String::new()
        }
    };

    let git_sha = match git_rev_parse(input.repo_root) {
        Ok(sha) => Some(sha),
        Err(err) => {
            errors.push(format!("git sha: {err}"));
            None
        }
    };

    if let Err(err) = write_config(&results_dir.join("llmfn.toml"), input.config) {
        errors.push(format!("llmfn.toml: {err:#}"));
    }

    if !errors.is_empty() {
        warn!(errors = ?errors, "result capture had errors");
    }

    let duration = input.finished_at - input.started_at;
    let meta = EvalMeta {
        suite_id: input.suite_id.to_string(),
        eval_run_id: input.eval_run_id.to_string(),
        suite_hash,
        git_sha,
        provider: input.provider.to_string(),
        model: input.config.invoker.model.clone(),
        max_attempts: input.config.max_attempts,
        jobs: input.jobs,
        start_time: input.started_at.to_rfc3339(),
        end_time: input.finished_at.to_rfc3339(),
        duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        counts: OutcomeCounts::from_results(input.cases),
        errors,
    };

    write_json(&results_dir.join("cases.json"), &input.cases)?;
    write_json(&results_dir.join("meta.json"), &meta)?;
    debug!(results_dir = %results_dir.display(), "results captured");
    Ok(meta)
}

pub fn results_dir(base_dir: &Path, suite_id: &str, eval_run_id: &str) -> PathBuf {
    base_dir.join(suite_id).join(eval_run_id)
}

pub fn read_meta(run_dir: &Path) -> Result<EvalMeta> {
    read_json(&run_dir.join("meta.json"))
}

pub fn read_case_results(run_dir: &Path) -> Result<Vec<CaseResult>> {
    read_json(&run_dir.join("cases.json"))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("serialize results")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

fn git_rev_parse(repo_root: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_root)
        .output()
        .context("git rev-parse")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("git rev-parse failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn case(id: &str, outcome: Outcome) -> CaseResult {
        CaseResult {
            id: id.to_string(),
            function: id.to_string(),
            outcome,
            attempts: 1,
            duration_secs: 0.5,
            value: (outcome == Outcome::Success).then(|| json!(true)),
            error: None,
            checks: Vec::new(),
        }
    }

    #[test]
    fn results_dir_is_stable() {
        let base = Path::new("/tmp/results");
        let dir = results_dir(base, "elderberry", "run-1");
        assert_eq!(dir, PathBuf::from("/tmp/results/elderberry/run-1"));
    }

    #[test]
    fn counts_outcomes() {
        let results = [
            case("a", Outcome::Success),
            case("b", Outcome::Success),
            case("c", Outcome::Exhausted),
            case("d", Outcome::ProviderError),
        ];
        let counts = OutcomeCounts::from_results(&results);
        assert_eq!(counts.success, 2);
        assert_eq!(counts.exhausted, 1);
        assert_eq!(counts.provider_error, 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn captures_meta_and_cases() {
        let temp = tempdir().expect("tempdir");
        let suite_path = temp.path().join("mini.toml");
        fs::write(&suite_path, "[suite]\nid = \"mini\"\n").expect("suite");
        let run_dir = results_dir(&temp.path().join("results"), "mini", "eval-1");
        let cases = vec![case("guess_letter", Outcome::Success)];
        let started_at = Utc::now();
        let input = CaptureInput {
            suite_id: "mini",
            suite_path: &suite_path,
            eval_run_id: "eval-1",
            config: &LlmfnConfig::default(),
            provider: "scripted",
            jobs: 2,
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(1500),
            repo_root: temp.path(),
            cases: &cases,
        };

        let meta = capture_results(&run_dir, &input).expect("capture");
        assert_eq!(meta.suite_hash.len(), 64);
        assert_eq!(meta.duration_secs, 1.5);
        assert_eq!(meta.counts.success, 1);
        // Not a git checkout.
        assert!(meta.git_sha.is_none());
        assert!(run_dir.join("llmfn.toml").is_file());

        let reread = read_meta(&run_dir).expect("meta");
        assert_eq!(reread.eval_run_id, "eval-1");
        assert_eq!(read_case_results(&run_dir).expect("cases"), cases);
    }
}
