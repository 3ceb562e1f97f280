//! Per-call time budget helpers.

use std::time::{Duration, Instant};

use crate::errors::ProviderError;

/// Timeout for the next provider request: the request timeout, capped by
/// whatever remains before `deadline`.
///
/// An exhausted budget is reported as a provider timeout so the call ends
/// before another request is sent.
pub fn attempt_timeout(
    request_timeout: Duration,
    deadline: Option<Instant>,
) -> Result<Duration, ProviderError> {
    let Some(deadline) = deadline else {
        return Ok(request_timeout);
    };
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(ProviderError::Timeout(Duration::from_secs(0)));
    }
    Ok(remaining.min(request_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_uses_request_timeout() {
        let timeout = attempt_timeout(Duration::from_secs(30), None).expect("timeout");
        assert_eq!(timeout, Duration::from_secs(30));
    }

    #[test]
    fn deadline_caps_request_timeout() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let timeout = attempt_timeout(Duration::from_secs(30), Some(deadline)).expect("timeout");
        assert!(timeout <= Duration::from_secs(5));
    }

    #[test]
    fn expired_deadline_is_a_timeout() {
        let deadline = Instant::now() - Duration::from_millis(1);
        let err = attempt_timeout(Duration::from_secs(30), Some(deadline)).unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }
}
