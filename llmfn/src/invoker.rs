//! Invoker: turns one prompt into one provider request and returns raw text.
//!
//! The invoker never retries and never interprets the completion; provider
//! failures propagate unchanged.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::function::{Flavor, FunctionSpec};
use crate::core::prompt::Prompt;
use crate::core::schema::SchemaDocument;
use crate::errors::ProviderError;
use crate::io::provider::{
    CompletionRequest, Message, Provider, ProviderCapabilities, ResponseFormat,
};

/// System message sent when the provider cannot constrain output itself.
pub const JSON_ONLY_CONTRACT: &str = "You are a function that replies with a single JSON value \
     and nothing else. Never add prose, explanations or Markdown code fences.";

/// Requested structured-output mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Strongest mode the provider supports for the return schema.
    #[default]
    Auto,
    JsonSchema,
    JsonObject,
    Text,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::Auto => "auto",
            OutputMode::JsonSchema => "json_schema",
            OutputMode::JsonObject => "json_object",
            OutputMode::Text => "text",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(OutputMode::Auto),
            "json_schema" => Ok(OutputMode::JsonSchema),
            "json_object" => Ok(OutputMode::JsonObject),
            "text" => Ok(OutputMode::Text),
            other => Err(format!(
                "unknown output mode '{other}' (expected auto, json_schema, json_object or text)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokerConfig {
    pub model: String,
    /// Sampling temperature; provider default when `None`.
    pub temperature: Option<f32>,
    /// Temperature for functions with the `random` flavor.
    pub random_temperature: f32,
    pub output_mode: OutputMode,
    pub request_timeout: Duration,
    /// Observe every attempt, regardless of the function's own debug flag.
    pub debug: bool,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            random_temperature: 1.0,
            output_mode: OutputMode::Auto,
            request_timeout: Duration::from_secs(120),
            debug: false,
        }
    }
}

/// Pick the response format for a return schema.
///
/// Structured modes are only used for object roots; anything else (and any
/// mode the provider lacks) degrades to text plus [`JSON_ONLY_CONTRACT`].
pub fn resolve_response_format(
    mode: OutputMode,
    capabilities: ProviderCapabilities,
    function: &str,
    schema: &SchemaDocument,
) -> ResponseFormat {
    let json_schema = || ResponseFormat::JsonSchema {
        name: function.to_string(),
        schema: schema.as_value().clone(),
    };
    if !schema.is_object() {
        return ResponseFormat::Text;
    }
    match mode {
        OutputMode::Text => ResponseFormat::Text,
        OutputMode::Auto if capabilities.json_schema => json_schema(),
        OutputMode::Auto if capabilities.json_object => ResponseFormat::JsonObject,
        OutputMode::Auto => ResponseFormat::Text,
        OutputMode::JsonSchema if capabilities.json_schema => json_schema(),
        OutputMode::JsonObject if capabilities.json_object => ResponseFormat::JsonObject,
        OutputMode::JsonSchema | OutputMode::JsonObject => {
            warn!(mode = %mode, "provider lacks requested output mode, falling back to text");
            ResponseFormat::Text
        }
    }
}

pub struct Invoker<P> {
    provider: P,
    config: InvokerConfig,
}

impl<P: Provider> Invoker<P> {
    pub fn new(provider: P, config: InvokerConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Build the provider request for one attempt.
    pub fn build_request(
        &self,
        spec: &FunctionSpec,
        return_schema: &SchemaDocument,
        prompt: &Prompt,
        timeout: Duration,
    ) -> CompletionRequest {
        let response_format = resolve_response_format(
            self.config.output_mode,
            self.provider.capabilities(),
            &spec.name,
            return_schema,
        );
        let mut messages = Vec::with_capacity(2);
        if response_format == ResponseFormat::Text {
            messages.push(Message::system(JSON_ONLY_CONTRACT));
        }
        messages.push(Message::user(prompt.as_str()));
        let temperature = if spec.has_flavor(Flavor::Random) {
            Some(self.config.random_temperature)
        } else {
            self.config.temperature
        };
        CompletionRequest {
            model: self.config.model.clone(),
            messages,
            response_format,
            temperature,
            timeout,
        }
    }

    /// Send one prompt and return the raw completion text.
    #[instrument(skip_all, fields(function = %spec.name, provider = self.provider.name()))]
    pub fn invoke(
        &self,
        spec: &FunctionSpec,
        return_schema: &SchemaDocument,
        prompt: &Prompt,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let request = self.build_request(spec, return_schema, prompt, timeout);
        debug!(
            format = request.response_format.as_str(),
            temperature = ?request.temperature,
            prompt_bytes = prompt.len(),
            "invoking provider"
        );
        self.provider.complete(&request)
    }
}
