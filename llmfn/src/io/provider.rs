//! Provider abstraction for completion backends.
//!
//! The [`Provider`] trait decouples the call pipeline from the concrete model
//! backend (an OpenAI-compatible HTTP endpoint or `codex exec`). Tests use
//! scripted providers that return predetermined completions.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::errors::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// How the provider is asked to shape its output.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// Free text; the prompt alone asks for JSON.
    Text,
    /// Any JSON object.
    JsonObject,
    /// JSON constrained by a schema whose root is an object.
    JsonSchema { name: String, schema: Value },
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Text => "text",
            ResponseFormat::JsonObject => "json_object",
            ResponseFormat::JsonSchema { .. } => "json_schema",
        }
    }
}

/// Structured-output features a provider supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub json_object: bool,
    pub json_schema: bool,
}

/// Parameters for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub response_format: ResponseFormat,
    pub temperature: Option<f32>,
    /// Maximum time to wait for this request.
    pub timeout: Duration,
}

impl CompletionRequest {
    /// Concatenated message contents, as fed to single-input backends.
    pub fn flattened_prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Abstraction over completion backends.
pub trait Provider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Return the raw completion text for `request`.
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        (**self).capabilities()
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        (**self).complete(request)
    }
}

impl<P: Provider + ?Sized> Provider for std::sync::Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        (**self).capabilities()
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        (**self).complete(request)
    }
}

impl<P: Provider + ?Sized> Provider for &P {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        (**self).capabilities()
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        (**self).complete(request)
    }
}
