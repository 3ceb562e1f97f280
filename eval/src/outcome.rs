use serde::{Deserialize, Serialize};

use llmfn::errors::CallError;

use crate::judge::CheckOutcome;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The call decoded and every check passed.
    Success,
    /// The call decoded but a check failed.
    Fail,
    /// Every attempt produced undecodable output.
    Exhausted,
    ProviderError,
    /// Arguments or declarations were rejected before any provider call.
    Invalid,
}

pub fn classify_outcome(error: Option<&CallError>, checks: &[CheckOutcome]) -> Outcome {
    match error {
        None if checks.iter().all(|check| check.passed) => Outcome::Success,
        None => Outcome::Fail,
        Some(CallError::Exhausted(_)) => Outcome::Exhausted,
        Some(CallError::Provider(_)) => Outcome::ProviderError,
        Some(CallError::Argument(_) | CallError::Unsupported(_)) => Outcome::Invalid,
    }
}
