//! Test-only helpers: scripted providers and sample declarations.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::core::function::FunctionSpec;
use crate::core::types::{Describe, TypeDescriptor};
use crate::errors::{ProviderError, UnsupportedTypeError};
use crate::io::attempt_log::{AttemptEvent, AttemptObserver, AttemptOutcome};
use crate::io::provider::{CompletionRequest, Provider, ProviderCapabilities};

/// Provider that replays a fixed list of replies and records every request.
///
/// Running out of replies is reported as a malformed response so a test that
/// over-calls fails loudly instead of hanging.
pub struct ScriptedProvider {
    capabilities: ProviderCapabilities,
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            capabilities: ProviderCapabilities::default(),
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Provider whose every reply succeeds with the given text.
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    /// User prompt of the `index`-th request.
    pub fn prompt(&self, index: usize) -> String {
        let requests = self.requests.lock().expect("requests lock");
        requests[index]
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderError::MalformedResponse(
                    "scripted provider has no replies left".to_string(),
                ))
            })
    }
}

/// Provider computing each reply from the request; safe to share across threads.
pub struct FnProvider<F> {
    reply: F,
}

impl<F> FnProvider<F>
where
    F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync,
{
    pub fn new(reply: F) -> Self {
        Self { reply }
    }
}

impl<F> Provider for FnProvider<F>
where
    F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync,
{
    fn name(&self) -> &str {
        "fn"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        (self.reply)(request)
    }
}

/// One attempt as seen by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedAttempt {
    pub attempt: u32,
    pub prompt: String,
    pub raw_response: String,
    /// `decoded`, `decode_failed` or `provider_failed`.
    pub outcome: &'static str,
}

/// Observer that keeps every attempt it is shown.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<ObservedAttempt>>,
}

impl RecordingObserver {
    pub fn attempts(&self) -> Vec<ObservedAttempt> {
        self.seen.lock().expect("observer lock").clone()
    }
}

impl AttemptObserver for RecordingObserver {
    fn on_attempt(&self, event: &AttemptEvent<'_>) {
        let outcome = match event.outcome {
            AttemptOutcome::Decoded => "decoded",
            AttemptOutcome::DecodeFailed(_) => "decode_failed",
            AttemptOutcome::ProviderFailed(_) => "provider_failed",
        };
        self.seen.lock().expect("observer lock").push(ObservedAttempt {
            attempt: event.attempt,
            prompt: event.prompt.to_string(),
            raw_response: event.raw_response.to_string(),
            outcome,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct House {
    pub color: String,
    pub size: i64,
    pub is_occupied: bool,
}

impl Describe for House {
    fn describe() -> Result<TypeDescriptor, UnsupportedTypeError> {
        TypeDescriptor::record("House")
            .field::<String>("color")
            .field::<i64>("size")
            .field::<bool>("is_occupied")
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: i64,
    pub city: String,
    pub home: House,
}

impl Describe for Person {
    fn describe() -> Result<TypeDescriptor, UnsupportedTypeError> {
        TypeDescriptor::record("Person")
            .field::<String>("name")
            .field::<i64>("age")
            .field::<String>("city")
            .field::<House>("home")
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Lavender,
    Indigo,
    Terracotta,
}

impl Describe for Color {
    fn describe() -> Result<TypeDescriptor, UnsupportedTypeError> {
        TypeDescriptor::enumeration("Color", ["lavender", "indigo", "terracotta"])
    }
}

pub fn house() -> TypeDescriptor {
    House::describe().expect("House descriptor")
}

pub fn person() -> TypeDescriptor {
    Person::describe().expect("Person descriptor")
}

pub fn color() -> TypeDescriptor {
    Color::describe().expect("Color descriptor")
}

pub fn player() -> TypeDescriptor {
    TypeDescriptor::record("Player")
        .field::<i64>("hp")
        .field::<i64>("def_")
        .field::<String>("name")
        .field::<i64>("mana")
        .build()
        .expect("Player descriptor")
}

/// `guess_letter(word: str, letter: str) -> bool`
pub fn guess_letter_spec() -> FunctionSpec {
    FunctionSpec::builder("guess_letter")
        .doc("Check if the letter is in the word.")
        .param::<String>("word")
        .param::<String>("letter")
        .returns::<bool>()
        .build()
        .expect("guess_letter spec")
}

/// `nested_dataclass() -> Person`
pub fn nested_dataclass_spec() -> FunctionSpec {
    FunctionSpec::builder("nested_dataclass")
        .doc("Generate a person who lives in a house.")
        .returns::<Person>()
        .build()
        .expect("nested_dataclass spec")
}
