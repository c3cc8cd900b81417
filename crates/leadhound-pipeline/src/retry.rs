//! Step-level retry for the orchestrator.

use std::fmt::Display;
use std::future::Future;

use leadhound_sources::retry_with_backoff;
pub use leadhound_sources::RetryPolicy;

/// Runs `operation` for `step` under the shared backoff, retrying errors for
/// which `retriable` holds, and logs the step as failed once retries run out.
pub(crate) async fn retry_step<T, E, F, Fut, R>(
    policy: RetryPolicy,
    step: &str,
    retriable: R,
    operation: F,
) -> Result<T, E>
where
    E: Display,
    R: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let result = retry_with_backoff(policy, step, &retriable, operation).await;
    if let Err(err) = &result {
        if retriable(err) {
            tracing::error!(
                step,
                attempts = policy.max_retries + 1,
                error = %err,
                "step failed after exhausting retries"
            );
        }
    }
    result
}
