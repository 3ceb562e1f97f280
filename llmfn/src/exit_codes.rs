//! Stable exit codes for the `llmfn` CLI.

use crate::errors::CallError;

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input: config, declaration file, arguments or unsupported types.
pub const INVALID: i32 = 1;
/// The provider failed (auth, rate limit, timeout, transport, ...).
pub const PROVIDER: i32 = 2;
/// Every attempt produced output that did not decode.
pub const EXHAUSTED: i32 = 3;

/// Exit code for a failed call.
pub fn for_call_error(err: &CallError) -> i32 {
    match err {
        CallError::Unsupported(_) | CallError::Argument(_) => INVALID,
        CallError::Provider(_) => PROVIDER,
        CallError::Exhausted(_) => EXHAUSTED,
    }
}
