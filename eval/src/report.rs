use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::outcome::Outcome;
use crate::results::{OutcomeCounts, read_case_results, read_meta};

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub runs: usize,
    pub counts: OutcomeCounts,
    pub avg_duration_secs: Option<f64>,
    /// Mean provider invocations per case.
    pub avg_attempts: Option<f64>,
    /// Per case id: (successes, runs).
    pub case_success_rates: BTreeMap<String, (usize, usize)>,
    /// Per `case/check` label: (passed, runs).
    pub check_pass_rates: BTreeMap<String, (usize, usize)>,
}

pub fn load_run_dirs(suite_results_dir: &Path) -> Result<Vec<PathBuf>> {
    if !suite_results_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(suite_results_dir)
        .with_context(|| format!("read {}", suite_results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn aggregate(suite_results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();
    let mut total_duration = 0.0;
    let mut total_attempts = 0u64;
    let mut total_cases = 0u64;

    for run_dir in load_run_dirs(suite_results_dir)? {
        let meta = match read_meta(&run_dir) {
            Ok(meta) => meta,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: meta.json invalid ({err:#})",
                    run_dir.display()
                ));
                continue;
            }
        };
        let cases = match read_case_results(&run_dir) {
            Ok(cases) => cases,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: cases.json invalid ({err:#})",
                    run_dir.display()
                ));
                continue;
            }
        };

        summary.runs += 1;
        summary.counts.add(&meta.counts);
        total_duration += meta.duration_secs;

        for case in &cases {
            total_cases += 1;
            total_attempts += u64::from(case.attempts);
            let entry = summary
                .case_success_rates
                .entry(case.id.clone())
                .or_insert((0, 0));
            if case.outcome == Outcome::Success {
                entry.0 += 1;
            }
            entry.1 += 1;

            for check in &case.checks {
                let entry = summary
                    .check_pass_rates
                    .entry(format!("{}/{}", case.id, check.label))
                    .or_insert((0, 0));
                if check.passed {
                    entry.0 += 1;
                }
                entry.1 += 1;
            }
        }
    }

    if summary.runs > 0 {
        summary.avg_duration_secs = Some(total_duration / summary.runs as f64);
    }
    if total_cases > 0 {
        summary.avg_attempts = Some(total_attempts as f64 / total_cases as f64);
    }
    Ok((summary, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::CheckOutcome;
    use crate::results::{CaseResult, EvalMeta};
    use tempfile::tempdir;

    fn write_run(dir: &Path, cases: &[CaseResult], duration: f64) {
        fs::create_dir_all(dir).expect("run dir");
        let meta = EvalMeta {
            suite_id: "elderberry".to_string(),
            eval_run_id: "run".to_string(),
            suite_hash: "hash".to_string(),
            git_sha: None,
            provider: "scripted".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_attempts: 3,
            jobs: 1,
            start_time: "now".to_string(),
            end_time: "later".to_string(),
            duration_secs: duration,
            counts: OutcomeCounts::from_results(cases),
            errors: Vec::new(),
        };
        let meta = serde_json::to_string_pretty(&meta).expect("meta json");
        fs::write(dir.join("meta.json"), meta).expect("write meta");
        let cases = serde_json::to_string_pretty(cases).expect("cases json");
        fs::write(dir.join("cases.json"), cases).expect("write cases");
    }

    fn case(outcome: Outcome, attempts: u32) -> CaseResult {
        CaseResult {
            id: "enum".to_string(),
            function: "enum".to_string(),
            outcome,
            attempts,
            duration_secs: 1.0,
            value: None,
            error: None,
            checks: vec![CheckOutcome {
                label: "one_of(3)".to_string(),
                passed: outcome == Outcome::Success,
            }],
        }
    }

    #[test]
    fn aggregates_runs() {
        let temp = tempdir().expect("tempdir");
        write_run(&temp.path().join("run1"), &[case(Outcome::Success, 1)], 5.0);
        write_run(&temp.path().join("run2"), &[case(Outcome::Exhausted, 3)], 15.0);

        let (summary, warnings) = aggregate(temp.path()).expect("aggregate");
        assert!(warnings.is_empty());
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.counts.success, 1);
        assert_eq!(summary.counts.exhausted, 1);
        assert_eq!(summary.avg_duration_secs, Some(10.0));
        assert_eq!(summary.avg_attempts, Some(2.0));
        assert_eq!(summary.case_success_rates.get("enum"), Some(&(1, 2)));
        assert_eq!(summary.check_pass_rates.get("enum/one_of(3)"), Some(&(1, 2)));
    }

    #[test]
    fn invalid_runs_are_skipped_with_warning() {
        let temp = tempdir().expect("tempdir");
        write_run(&temp.path().join("run1"), &[case(Outcome::Success, 1)], 2.0);
        let broken = temp.path().join("run2");
        fs::create_dir_all(&broken).expect("dir");
        fs::write(broken.join("meta.json"), "{").expect("write");

        let (summary, warnings) = aggregate(temp.path()).expect("aggregate");
        assert_eq!(summary.runs, 1);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("meta.json invalid"));
    }

    #[test]
    fn missing_results_dir_is_empty() {
        let temp = tempdir().expect("tempdir");
        let (summary, warnings) = aggregate(&temp.path().join("none")).expect("aggregate");
        assert_eq!(summary.runs, 0);
        assert!(summary.avg_duration_secs.is_none());
        assert!(warnings.is_empty());
    }
}
