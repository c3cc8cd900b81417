//! Jittered exponential backoff shared by connectors and orchestrator steps.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::error::SourceError;

/// Additional attempts a connector makes after its first request.
pub(crate) const MAX_RETRIES: u32 = 2;

const MAX_DELAY_MS: u64 = 60_000;

/// How often and how patiently a failed operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            backoff_base_ms: 1_000,
        }
    }
}

/// Connector policy: [`MAX_RETRIES`] with the connector's own base delay.
pub(crate) fn connector_policy(backoff_base_ms: u64) -> RetryPolicy {
    RetryPolicy {
        max_retries: MAX_RETRIES,
        backoff_base_ms,
    }
}

/// Rate limits and transport failures are worth another attempt. Other
/// statuses, auth failures and bad payloads are returned immediately.
pub(crate) fn is_retriable(err: &SourceError) -> bool {
    match err {
        SourceError::RateLimited { .. } => true,
        SourceError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        SourceError::Deserialize { .. }
        | SourceError::UnexpectedStatus { .. }
        | SourceError::Auth { .. } => false,
    }
}

/// Runs `operation`, retrying errors for which `retriable` holds up to
/// `policy.max_retries` times.
///
/// Sleeps `backoff_base_ms * 2^(attempt-1)` with ±25 % jitter between
/// attempts, capped at 60 s. The last error is returned once retries are
/// exhausted, so a retriable `Err` coming back means they were.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: RetryPolicy,
    operation_name: &str,
    retriable: R,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    R: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !retriable(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay_ms = backoff_delay_ms(policy.backoff_base_ms, attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms,
                    error = %err,
                    "transient failure, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let computed = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
    let capped = computed.min(MAX_DELAY_MS);
    (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64
}
