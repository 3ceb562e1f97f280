//! Retry state machine for malformed model output.
//!
//! `Attempting(1) -> Succeeded | Attempting(n + 1) -> Exhausted`. Only decode
//! failures advance the machine; provider failures end the call outside it.

use crate::errors::DecodeError;

/// Default attempt bound when none is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One round trip to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1-indexed attempt number.
    pub index: u32,
    pub prompt: String,
    pub raw_response: String,
    /// `None` when this attempt decoded successfully.
    pub error: Option<DecodeError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` invocations in total (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Succeeded,
    Exhausted,
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting(1)
    }

    /// Transition after the current attempt decoded.
    pub fn on_success(self) -> Self {
        match self {
            RetryState::Attempting(_) => RetryState::Succeeded,
            terminal => terminal,
        }
    }

    /// Transition after the current attempt failed to decode.
    pub fn on_decode_failure(self, policy: RetryPolicy) -> Self {
        match self {
            RetryState::Attempting(n) if n < policy.max_attempts() => {
                RetryState::Attempting(n + 1)
            }
            RetryState::Attempting(_) => RetryState::Exhausted,
            terminal => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RetryState::Attempting(_))
    }
}
