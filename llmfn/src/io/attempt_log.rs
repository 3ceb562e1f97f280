//! Debug observation of individual attempts.
//!
//! Observers only run for calls whose function or invoker has the debug flag
//! set. [`TracingObserver`] emits `tracing` events; [`AttemptLogWriter`] keeps
//! an on-disk record of every attempt:
//!
//! ```text
//! <root>/<function>/<call>/<attempt>/prompt.md
//!                                   /response.txt
//!                                   /meta.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{DecodeError, ProviderError};

/// What happened to one attempt.
#[derive(Debug, Clone, Copy)]
pub enum AttemptOutcome<'a> {
    Decoded,
    DecodeFailed(&'a DecodeError),
    /// The provider returned no response; the call ends here.
    ProviderFailed(&'a ProviderError),
}

/// One completed attempt, as seen by observers.
#[derive(Debug, Clone, Copy)]
pub struct AttemptEvent<'a> {
    pub function: &'a str,
    /// Pipeline-local call sequence number.
    pub call: u64,
    pub attempt: u32,
    pub max_attempts: u32,
    pub prompt: &'a str,
    pub raw_response: &'a str,
    pub outcome: AttemptOutcome<'a>,
}

pub trait AttemptObserver: Send + Sync {
    fn on_attempt(&self, event: &AttemptEvent<'_>);
}

/// Emits each attempt as `tracing` events under the `llmfn::attempt` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AttemptObserver for TracingObserver {
    fn on_attempt(&self, event: &AttemptEvent<'_>) {
        match event.outcome {
            AttemptOutcome::Decoded => info!(
                target: "llmfn::attempt",
                function = event.function,
                call = event.call,
                attempt = event.attempt,
                prompt = event.prompt,
                response = event.raw_response,
                "attempt decoded"
            ),
            AttemptOutcome::DecodeFailed(err) => info!(
                target: "llmfn::attempt",
                function = event.function,
                call = event.call,
                attempt = event.attempt,
                max_attempts = event.max_attempts,
                prompt = event.prompt,
                response = event.raw_response,
                error = %err,
                "attempt failed to decode"
            ),
            AttemptOutcome::ProviderFailed(err) => info!(
                target: "llmfn::attempt",
                function = event.function,
                call = event.call,
                attempt = event.attempt,
                prompt = event.prompt,
                error = %err,
                "attempt failed in the provider"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttemptMeta {
    pub function: String,
    pub call: u64,
    pub attempt: u32,
    pub max_attempts: u32,
    pub decoded: bool,
    pub error_path: Option<String>,
    pub error: Option<String>,
}

impl AttemptMeta {
    fn from_event(event: &AttemptEvent<'_>) -> Self {
        let (decoded, error_path, error) = match event.outcome {
            AttemptOutcome::Decoded => (true, None, None),
            AttemptOutcome::DecodeFailed(err) => {
                (false, Some(err.path.clone()), Some(err.to_string()))
            }
            AttemptOutcome::ProviderFailed(err) => (false, None, Some(err.to_string())),
        };
        Self {
            function: event.function.to_string(),
            call: event.call,
            attempt: event.attempt,
            max_attempts: event.max_attempts,
            decoded,
            error_path,
            error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub prompt_path: PathBuf,
    pub response_path: PathBuf,
    pub meta_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(root: &Path, function: &str, call: u64, attempt: u32) -> Self {
        let dir = root
            .join(function)
            .join(format!("{call:04}"))
            .join(attempt.to_string());
        Self {
            prompt_path: dir.join("prompt.md"),
            response_path: dir.join("response.txt"),
            meta_path: dir.join("meta.json"),
            dir,
        }
    }
}

/// Write one attempt's artifacts under `root`.
pub fn write_attempt(root: &Path, event: &AttemptEvent<'_>) -> Result<AttemptPaths> {
    let paths = AttemptPaths::new(root, event.function, event.call, event.attempt);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;
    write_text(&paths.prompt_path, event.prompt)?;
    write_text(&paths.response_path, event.raw_response)?;
    let mut meta = serde_json::to_string_pretty(&AttemptMeta::from_event(event))?;
    meta.push('\n');
    write_text(&paths.meta_path, &meta)?;
    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Observer persisting attempts to disk and echoing them to `tracing`.
///
/// Write failures are logged and never fail the call.
#[derive(Debug)]
pub struct AttemptLogWriter {
    root: PathBuf,
}

impl AttemptLogWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AttemptObserver for AttemptLogWriter {
    fn on_attempt(&self, event: &AttemptEvent<'_>) {
        TracingObserver.on_attempt(event);
        if let Err(err) = write_attempt(&self.root, event) {
            warn!(err = %format!("{err:#}"), root = %self.root.display(), "failed to write attempt log");
        }
    }
}

/// Monotonic call numbering shared by one pipeline.
#[derive(Debug, Default)]
pub struct CallCounter(AtomicU64);

impl CallCounter {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DecodeErrorKind;

    #[test]
    fn attempt_paths_are_stable() {
        let paths = AttemptPaths::new(Path::new("/logs"), "guess_letter", 7, 2);
        assert!(paths.dir.ends_with(Path::new("guess_letter/0007/2")));
        assert!(paths.prompt_path.ends_with("prompt.md"));
        assert!(paths.response_path.ends_with("response.txt"));
        assert!(paths.meta_path.ends_with("meta.json"));
    }

    #[test]
    fn writer_persists_failed_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = DecodeError::new(
            "hp",
            DecodeErrorKind::TypeMismatch {
                expected: "integer".to_string(),
                found: "string".to_string(),
            },
        );
        let event = AttemptEvent {
            function: "receive_attack",
            call: 1,
            attempt: 1,
            max_attempts: 3,
            prompt: "the prompt",
            raw_response: "{\"hp\": \"100\"}",
            outcome: AttemptOutcome::DecodeFailed(&err),
        };
        AttemptLogWriter::new(temp.path()).on_attempt(&event);

        let paths = AttemptPaths::new(temp.path(), "receive_attack", 1, 1);
        assert_eq!(
            fs::read_to_string(&paths.prompt_path).expect("prompt"),
            "the prompt"
        );
        assert_eq!(
            fs::read_to_string(&paths.response_path).expect("response"),
            "{\"hp\": \"100\"}"
        );
        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.meta_path).expect("meta"))
                .expect("json");
        assert_eq!(meta["decoded"], false);
        assert_eq!(meta["error_path"], "hp");
    }

    #[test]
    fn writer_persists_provider_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = ProviderError::RateLimited("slow down".to_string());
        let event = AttemptEvent {
            function: "guess_letter",
            call: 3,
            attempt: 1,
            max_attempts: 3,
            prompt: "the prompt",
            raw_response: "",
            outcome: AttemptOutcome::ProviderFailed(&err),
        };
        AttemptLogWriter::new(temp.path()).on_attempt(&event);

        let paths = AttemptPaths::new(temp.path(), "guess_letter", 3, 1);
        assert_eq!(
            fs::read_to_string(&paths.prompt_path).expect("prompt"),
            "the prompt"
        );
        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.meta_path).expect("meta"))
                .expect("json");
        assert_eq!(meta["decoded"], false);
        assert_eq!(meta["error_path"], serde_json::Value::Null);
        assert!(
            meta["error"]
                .as_str()
                .is_some_and(|error| error.contains("slow down"))
        );
    }

    #[test]
    fn call_counter_starts_at_one() {
        let counter = CallCounter::default();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
    }
}
