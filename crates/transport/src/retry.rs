use std::future::Future;
use std::time::Duration;

use dealflow_core::ApiError;
use tracing::warn;

use crate::{ApiResponse, BoxError, TransportError};

/// Bounded retry with bounded exponential backoff.
///
/// Defaults: 3 total attempts, backoff starting at 0.5s, doubling, capped at
/// 4s. Each `execute` call owns its own independent loop; concurrent calls
/// never share attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given how many attempts have completed.
    /// Monotonically non-decreasing: initial, doubled per attempt, capped.
    pub fn backoff_after(&self, completed_attempts: u32) -> Duration {
        let exponent = completed_attempts.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent).min(self.max_backoff)
    }
}

/// Outcome of a single attempt, classified for the retry loop.
pub(crate) enum AttemptFailure {
    /// An HTTP response outside [200, 300): never retried.
    Fatal(ApiError),
    /// A transport-level fault (connect, timeout): retried while attempts
    /// remain.
    Retryable(BoxError),
}

pub(crate) async fn run_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<ApiResponse, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ApiResponse, AttemptFailure>>,
{
    let mut last_failure: Option<BoxError> = None;

    for attempt_number in 1..=policy.max_attempts {
        match attempt().await {
            Ok(response) => return Ok(response),
            Err(AttemptFailure::Fatal(error)) => return Err(TransportError::Api(error)),
            Err(AttemptFailure::Retryable(source)) => {
                warn!(
                    event_name = "transport.attempt.transient_failure",
                    attempt = attempt_number,
                    max_attempts = policy.max_attempts,
                    error = %source,
                    "transient transport failure, will retry if attempts remain"
                );
                last_failure = Some(source);
                if attempt_number < policy.max_attempts {
                    tokio::time::sleep(policy.backoff_after(attempt_number)).await;
                }
            }
        }
    }

    Err(TransportError::Transient {
        attempts: policy.max_attempts,
        source: last_failure.unwrap_or_else(|| "no attempts were made".into()),
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use dealflow_core::ApiError;
    use serde_json::json;

    use crate::{ApiResponse, ResponseBody, TransportError};

    use super::{run_with_retry, AttemptFailure, RetryPolicy};

    fn ok_response() -> ApiResponse {
        ApiResponse { status: 200, body: ResponseBody::Json(json!({"ok": true})) }
    }

    #[test]
    fn backoff_doubles_from_initial_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(3), Duration::from_secs(2));
        assert_eq!(policy.backoff_after(4), Duration::from_secs(4));
        assert_eq!(policy.backoff_after(5), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_monotonically_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for completed in 1..32 {
            let delay = policy.backoff_after(completed);
            assert!(delay >= previous, "backoff shrank after {completed} attempts");
            previous = delay;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_transient_failures() {
        let attempts = Cell::new(0u32);
        let result = run_with_retry(&RetryPolicy::default(), || {
            attempts.set(attempts.get() + 1);
            let attempt = attempts.get();
            async move {
                if attempt < 3 {
                    Err(AttemptFailure::Retryable("connect timeout".into()))
                } else {
                    Ok(ok_response())
                }
            }
        })
        .await;

        assert_eq!(attempts.get(), 3);
        assert_eq!(result.expect("third attempt should succeed").status, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn http_error_is_fatal_and_never_retried() {
        let attempts = Cell::new(0u32);
        let result = run_with_retry(&RetryPolicy::default(), || {
            attempts.set(attempts.get() + 1);
            async { Err(AttemptFailure::Fatal(ApiError::new(500, "http request failed"))) }
        })
        .await;

        assert_eq!(attempts.get(), 1, "a 5xx response must not consume retries");
        match result {
            Err(TransportError::Api(error)) => assert_eq!(error.status, 500),
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_surfaces_transient_error_with_attempt_count() {
        let attempts = Cell::new(0u32);
        let result = run_with_retry(&RetryPolicy::default(), || {
            attempts.set(attempts.get() + 1);
            async { Err(AttemptFailure::Retryable("connection reset".into())) }
        })
        .await;

        assert_eq!(attempts.get(), 3);
        match result {
            Err(TransportError::Transient { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected transient exhaustion, got {other:?}"),
        }
    }
}
