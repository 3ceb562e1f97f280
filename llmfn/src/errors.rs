//! Error taxonomy for declared-function calls.
//!
//! Only [`UnsupportedTypeError`], [`ProviderError`], [`ArgumentError`] and
//! [`StructuredGenerationError`] reach callers (wrapped in [`CallError`]).
//! [`DecodeError`] is recovered by the retry loop unless attempts run out.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::core::retry::AttemptRecord;

/// A declared type has no structural shape the pipeline can describe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported type `{type_name}`: {reason}")]
pub struct UnsupportedTypeError {
    pub type_name: String,
    pub reason: String,
}

impl UnsupportedTypeError {
    pub fn new(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

/// The provider could not serve a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider rejected credentials: {0}")]
    Auth(String),
    #[error("provider rate limit hit: {0}")]
    RateLimited(String),
    #[error("provider request timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider rejected request: {0}")]
    MalformedRequest(String),
    #[error("provider returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("provider response could not be read: {0}")]
    MalformedResponse(String),
    #[error("provider transport failed: {0}")]
    Transport(String),
}

/// Why a raw response could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    NotJson { message: String },
    MissingField { field: String },
    TypeMismatch { expected: String, found: String },
    InvalidEnumVariant { variant: String, allowed: Vec<String> },
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErrorKind::NotJson { message } => write!(f, "not valid JSON ({message})"),
            DecodeErrorKind::MissingField { field } => {
                write!(f, "missing required field `{field}`")
            }
            DecodeErrorKind::TypeMismatch { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            DecodeErrorKind::InvalidEnumVariant { variant, allowed } => write!(
                f,
                "`{variant}` is not one of [{}]",
                allowed
                    .iter()
                    .map(|v| format!("\"{v}\""))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// A raw response failed to parse or to coerce into the declared return type.
///
/// `path` is empty when the failure is at the root value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at {}: {kind}", display_path(.path))]
pub struct DecodeError {
    pub path: String,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(path: impl Into<String>, kind: DecodeErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}

/// A call argument does not match its declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("`{function}` takes {expected} argument(s) but {given} were given")]
    Arity {
        function: String,
        expected: usize,
        given: usize,
    },
    #[error("argument `{param}` does not match its declared type: {}", .messages.join("; "))]
    Invalid { param: String, messages: Vec<String> },
    #[error(
        "arguments of `{function}` need a {required_bytes}-byte prompt, over the {budget_bytes}-byte budget"
    )]
    PromptTooLarge {
        function: String,
        required_bytes: usize,
        budget_bytes: usize,
    },
}

/// Terminal failure after every attempt produced undecodable output.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "`{function}` produced no valid output after {} attempt(s); last error: {}",
    .attempts.len(),
    last_error(.attempts)
)]
pub struct StructuredGenerationError {
    pub function: String,
    pub attempts: Vec<AttemptRecord>,
}

fn last_error(attempts: &[AttemptRecord]) -> String {
    attempts
        .iter()
        .rev()
        .find_map(|attempt| attempt.error.as_ref())
        .map(ToString::to_string)
        .unwrap_or_else(|| "none recorded".to_string())
}

/// Every error a call can surface to its caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedTypeError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Argument(#[from] ArgumentError),
    #[error(transparent)]
    Exhausted(#[from] StructuredGenerationError),
}
