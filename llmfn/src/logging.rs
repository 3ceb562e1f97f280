//! Diagnostic tracing for the `llmfn` and `eval` binaries.
//!
//! Tracing is development output on stderr, filtered by `RUST_LOG`. Per-attempt
//! prompts and responses are only emitted in debug mode (see
//! [`crate::io::attempt_log`]), and the default filter always lets them through.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Defaults to `warn` plus debug-mode attempt
/// events when `RUST_LOG` is unset.
///
/// `verbose` raises the default to `info` for the `llmfn` and `eval` targets.
///
/// ```bash
/// RUST_LOG=llmfn=debug llmfn call fns.toml guess_letter --args '["xertz", "t"]'
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,llmfn=info,eval=info"
    } else {
        "warn,llmfn::attempt=info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_passes_attempt_events() {
        for verbose in [false, true] {
            let directives = default_directives(verbose);
            assert!(
                directives.contains("llmfn::attempt=info") || directives.contains("llmfn=info"),
                "{directives}"
            );
            assert!(EnvFilter::try_new(directives).is_ok());
        }
    }
}
