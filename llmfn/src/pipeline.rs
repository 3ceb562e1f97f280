//! Call pipeline: arguments -> prompt -> provider -> decoded value, with retries.
//!
//! A [`CallPipeline`] is built once per declared function. Construction derives
//! and compiles every schema, so a pipeline that exists can always render its
//! prompts; per-call work is limited to validation, invocation and decoding.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::budget::attempt_timeout;
use crate::core::decode::decode;
use crate::core::function::FunctionSpec;
use crate::core::prompt::{Feedback, Prompt, PromptBuilder, PromptInputs};
use crate::core::retry::{AttemptRecord, RetryPolicy, RetryState};
use crate::core::schema::{CompiledSchema, SchemaDocument, derive_schema};
use crate::core::value::DecodedValue;
use crate::errors::{ArgumentError, CallError, StructuredGenerationError, UnsupportedTypeError};
use crate::invoker::Invoker;
use crate::io::attempt_log::{
    AttemptEvent, AttemptObserver, AttemptOutcome, CallCounter, TracingObserver,
};
use crate::io::provider::Provider;

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    pub prompts: PromptBuilder,
    /// Budget for a whole call, retries included.
    pub call_timeout: Option<Duration>,
}

pub struct CallPipeline<P> {
    spec: FunctionSpec,
    return_schema: SchemaDocument,
    param_schemas: Vec<CompiledSchema>,
    invoker: Invoker<P>,
    config: PipelineConfig,
    observer: Arc<dyn AttemptObserver>,
    calls: CallCounter,
}

impl<P: Provider> CallPipeline<P> {
    /// Prepare a function for calls.
    pub fn new(
        spec: FunctionSpec,
        invoker: Invoker<P>,
        config: PipelineConfig,
    ) -> Result<Self, UnsupportedTypeError> {
        let return_schema = derive_schema(&spec.returns);
        // Fail at declaration time if the derived schema is not usable.
        return_schema.compile(&spec.returns.type_name())?;
        let param_schemas = spec
            .params
            .iter()
            .map(|param| derive_schema(&param.ty).compile(&param.ty.type_name()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            spec,
            return_schema,
            param_schemas,
            invoker,
            config,
            observer: Arc::new(TracingObserver),
            calls: CallCounter::default(),
        })
    }

    /// Replace the observer notified of attempts in debug mode.
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    pub fn return_schema(&self) -> &SchemaDocument {
        &self.return_schema
    }

    pub fn invoker(&self) -> &Invoker<P> {
        &self.invoker
    }

    /// Check arity and validate each argument against its parameter schema.
    pub fn check_arguments(&self, args: &[Value]) -> Result<(), ArgumentError> {
        if args.len() != self.spec.params.len() {
            return Err(ArgumentError::Arity {
                function: self.spec.name.clone(),
                expected: self.spec.params.len(),
                given: args.len(),
            });
        }
        for ((param, schema), value) in self.spec.params.iter().zip(&self.param_schemas).zip(args)
        {
            schema
                .validate(value)
                .map_err(|messages| ArgumentError::Invalid {
                    param: param.name.clone(),
                    messages,
                })?;
        }
        Ok(())
    }

    /// First-attempt prompt for `args`, without calling the provider.
    pub fn render_prompt(&self, args: &[Value]) -> Result<Prompt, ArgumentError> {
        self.check_arguments(args)?;
        self.build_prompt(args, None)
    }

    fn build_prompt(
        &self,
        args: &[Value],
        feedback: Option<&Feedback>,
    ) -> Result<Prompt, ArgumentError> {
        self.config
            .prompts
            .build(&PromptInputs {
                spec: &self.spec,
                arguments: args,
                return_schema: &self.return_schema,
                feedback,
            })
            .map_err(|err| ArgumentError::PromptTooLarge {
                function: self.spec.name.clone(),
                required_bytes: err.required_bytes,
                budget_bytes: err.budget_bytes,
            })
    }

    fn observe(
        &self,
        call: u64,
        attempt: u32,
        prompt: &Prompt,
        raw: &str,
        outcome: AttemptOutcome<'_>,
    ) {
        self.observer.on_attempt(&AttemptEvent {
            function: &self.spec.name,
            call,
            attempt,
            max_attempts: self.config.retry.max_attempts(),
            prompt: prompt.as_str(),
            raw_response: raw,
            outcome,
        });
    }

    fn debug_enabled(&self) -> bool {
        self.spec.debug || self.invoker.config().debug
    }

    /// Call the function once, retrying malformed output up to the policy bound.
    #[instrument(skip_all, fields(function = %self.spec.name))]
    pub fn invoke(&self, args: &[Value]) -> Result<DecodedValue, CallError> {
        self.check_arguments(args)?;
        let call = self.calls.next();
        let deadline = self.config.call_timeout.map(|budget| Instant::now() + budget);
        let max_attempts = self.config.retry.max_attempts();
        let debug_enabled = self.debug_enabled();

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut feedback: Option<Feedback> = None;
        let mut state = RetryState::start();

        while let RetryState::Attempting(index) = state {
            let timeout = attempt_timeout(self.invoker.config().request_timeout, deadline)?;
            let prompt = self.build_prompt(args, feedback.as_ref())?;
            let raw = match self
                .invoker
                .invoke(&self.spec, &self.return_schema, &prompt, timeout)
            {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(attempt = index, err = %err, "provider failed");
                    if debug_enabled {
                        let outcome = AttemptOutcome::ProviderFailed(&err);
                        self.observe(call, index, &prompt, "", outcome);
                    }
                    return Err(err.into());
                }
            };

            match decode(&raw, &self.spec.returns) {
                Ok(value) => {
                    if debug_enabled {
                        self.observe(call, index, &prompt, &raw, AttemptOutcome::Decoded);
                    }
                    state = state.on_success();
                    debug!(attempt = index, ?state, "call resolved");
                    return Ok(value);
                }
                Err(err) => {
                    if debug_enabled {
                        let outcome = AttemptOutcome::DecodeFailed(&err);
                        self.observe(call, index, &prompt, &raw, outcome);
                    }
                    info!(attempt = index, max_attempts, err = %err, "response did not decode");
                    feedback = Some(Feedback {
                        attempt: index,
                        previous_response: raw.clone(),
                        error: err.to_string(),
                    });
                    attempts.push(AttemptRecord {
                        index,
                        prompt: prompt.into_string(),
                        raw_response: raw,
                        error: Some(err),
                    });
                    state = state.on_decode_failure(self.config.retry);
                }
            }
        }

        warn!(attempts = attempts.len(), "retries exhausted");
        Err(StructuredGenerationError {
            function: self.spec.name.clone(),
            attempts,
        }
        .into())
    }

    /// Call the function and convert the result into `R`.
    ///
    /// A value that decodes against the declared type but does not fit `R`
    /// means `R` and the declaration disagree, which is reported as an
    /// unsupported type.
    pub fn call<R: DeserializeOwned>(&self, args: &[Value]) -> Result<R, CallError> {
        let value = self.invoke(args)?;
        value.into_typed().map_err(|err| {
            UnsupportedTypeError::new(
                std::any::type_name::<R>(),
                format!("does not match declared return type {}: {err}", self.spec.returns),
            )
            .into()
        })
    }

    /// Run independent calls on up to `jobs` worker threads.
    ///
    /// Results come back in input order.
    pub fn invoke_all(
        &self,
        calls: &[Vec<Value>],
        jobs: usize,
    ) -> Vec<Result<DecodedValue, CallError>> {
        run_ordered(calls, jobs, |args| self.invoke(args))
    }
}

/// Apply `f` to every item on up to `jobs` scoped worker threads.
///
/// Results come back in input order. A panicking worker panics the caller.
pub fn run_ordered<T, R, F>(items: &[T], jobs: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let jobs = jobs.clamp(1, items.len().max(1));
    let next = AtomicUsize::new(0);
    let mut indexed: Vec<(usize, R)> = thread::scope(|scope| {
        let workers: Vec<_> = (0..jobs)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(index) else {
                            break;
                        };
                        done.push((index, f(item)));
                    }
                    done
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| {
                worker
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    });
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TypeDescriptor;
    use crate::errors::{DecodeErrorKind, ProviderError};
    use crate::invoker::InvokerConfig;
    use crate::test_support::{ScriptedProvider, guess_letter_spec};
    use serde_json::json;

    fn pipeline(spec: FunctionSpec, provider: ScriptedProvider) -> CallPipeline<ScriptedProvider> {
        CallPipeline::new(
            spec,
            Invoker::new(provider, InvokerConfig::default()),
            PipelineConfig::default(),
        )
        .expect("pipeline")
    }

    #[test]
    fn wrong_arity_is_rejected_before_invocation() {
        let pipeline = pipeline(guess_letter_spec(), ScriptedProvider::replying(["true"]));
        let err = pipeline.invoke(&[json!("xertz")]).unwrap_err();
        assert_eq!(
            err,
            CallError::Argument(ArgumentError::Arity {
                function: "guess_letter".to_string(),
                expected: 2,
                given: 1,
            })
        );
        assert_eq!(pipeline.invoker().provider().call_count(), 0);
    }

    #[test]
    fn mistyped_argument_is_rejected_before_invocation() {
        let pipeline = pipeline(guess_letter_spec(), ScriptedProvider::replying(["true"]));
        let err = pipeline.invoke(&[json!("xertz"), json!(7)]).unwrap_err();
        let (param, messages) = match err {
            CallError::Argument(ArgumentError::Invalid { param, messages }) => (param, messages),
            other => panic!("expected invalid argument, got {other:?}"),
        };
        assert_eq!(param, "letter");
        assert!(!messages.is_empty());
        assert_eq!(pipeline.invoker().provider().call_count(), 0);
    }

    #[test]
    fn decode_failure_then_success_retries_once() {
        let pipeline = pipeline(
            guess_letter_spec(),
            ScriptedProvider::replying(["yes it is", "true"]),
        );
        let value = pipeline.invoke(&[json!("xertz"), json!("t")]).expect("value");
        assert_eq!(value, DecodedValue::Bool(true));
        assert_eq!(pipeline.invoker().provider().call_count(), 2);
        let retry_prompt = pipeline.invoker().provider().prompt(1);
        assert!(retry_prompt.contains("<previous_response>\nyes it is"));
        assert!(retry_prompt.contains("not valid JSON"));
    }

    #[test]
    fn exhaustion_carries_every_attempt() {
        let spec = FunctionSpec::builder("get_avg_len")
            .param_with("words", TypeDescriptor::list(TypeDescriptor::string()))
            .returns::<i64>()
            .build()
            .expect("spec");
        let pipeline = CallPipeline::new(
            spec,
            Invoker::new(
                ScriptedProvider::replying(["\"five\"", "4.5", "{}", "unused"]),
                InvokerConfig::default(),
            ),
            PipelineConfig {
                retry: RetryPolicy::new(3),
                ..PipelineConfig::default()
            },
        )
        .expect("pipeline");
        let err = pipeline.invoke(&[json!(["fig", "plum"])]).unwrap_err();
        let exhausted = match err {
            CallError::Exhausted(exhausted) => exhausted,
            other => panic!("expected exhaustion, got {other:?}"),
        };
        assert_eq!(exhausted.attempts.len(), 3);
        assert_eq!(
            exhausted.attempts.iter().map(|a| a.index).collect::<Vec<_>>(),
            [1, 2, 3]
        );
        assert_eq!(exhausted.attempts[0].raw_response, "\"five\"");
        assert!(matches!(
            exhausted.attempts[2].error.as_ref().map(|e| &e.kind),
            Some(DecodeErrorKind::TypeMismatch { .. })
        ));
        assert_eq!(pipeline.invoker().provider().call_count(), 3);
    }

    #[test]
    fn provider_error_is_not_retried() {
        let pipeline = pipeline(
            guess_letter_spec(),
            ScriptedProvider::new(vec![
                Err(ProviderError::RateLimited("slow down".to_string())),
                Ok("true".to_string()),
            ]),
        );
        let err = pipeline.invoke(&[json!("xertz"), json!("t")]).unwrap_err();
        assert!(matches!(err, CallError::Provider(ProviderError::RateLimited(_))));
        assert_eq!(pipeline.invoker().provider().call_count(), 1);
    }

    #[test]
    fn expired_call_budget_is_a_provider_timeout() {
        let pipeline = CallPipeline::new(
            guess_letter_spec(),
            Invoker::new(ScriptedProvider::replying(["true"]), InvokerConfig::default()),
            PipelineConfig {
                call_timeout: Some(Duration::ZERO),
                ..PipelineConfig::default()
            },
        )
        .expect("pipeline");
        let err = pipeline.invoke(&[json!("xertz"), json!("t")]).unwrap_err();
        assert!(matches!(err, CallError::Provider(ProviderError::Timeout(_))));
        assert_eq!(pipeline.invoker().provider().call_count(), 0);
    }

    #[test]
    fn call_converts_into_caller_type() {
        let pipeline = pipeline(
            FunctionSpec::builder("choose_words")
                .param::<i64>("n")
                .returns::<Vec<String>>()
                .build()
                .expect("spec"),
            ScriptedProvider::replying([r#"["fig", "plum"]"#]),
        );
        let words: Vec<String> = pipeline.call(&[json!(2)]).expect("words");
        assert_eq!(words, ["fig", "plum"]);
    }

    #[test]
    fn call_reports_mismatched_caller_type() {
        let pipeline = pipeline(guess_letter_spec(), ScriptedProvider::replying(["true"]));
        let err = pipeline
            .call::<String>(&[json!("xertz"), json!("t")])
            .unwrap_err();
        assert!(matches!(err, CallError::Unsupported(_)));
    }

    #[test]
    fn run_ordered_keeps_input_order() {
        let items: Vec<u64> = (0..50).collect();
        for jobs in [0, 1, 4, 100] {
            let doubled = run_ordered(&items, jobs, |n| {
                if n % 7 == 0 {
                    std::thread::sleep(Duration::from_millis(2));
                }
                n * 2
            });
            assert_eq!(doubled, items.iter().map(|n| n * 2).collect::<Vec<_>>());
        }
        assert!(run_ordered(&[] as &[u64], 4, |n| *n).is_empty());
    }
}
