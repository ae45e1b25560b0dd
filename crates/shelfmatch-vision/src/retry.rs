//! Retry with exponential back-off and jitter for vision calls.
//!
//! Malformed responses are never retried — the model gave a well-formed HTTP
//! reply with unusable content, and replaying the same inputs is how vision
//! bills are doubled for nothing. Only transport failures, 5xx, and explicit
//! rate-limit signals back off and retry.

use std::future::Future;
use std::time::Duration;

use crate::error::VisionError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
pub(crate) fn is_retriable(err: &VisionError) -> bool {
    match err {
        VisionError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        VisionError::RateLimited { .. } => true,
        VisionError::UnexpectedStatus { .. }
        | VisionError::MalformedResponse { .. }
        | VisionError::InvalidBaseUrl { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// transient errors, sleeping `backoff_base_ms * 2^(attempt-1)` ± 25 %
/// jitter between attempts, capped at 30 s. A `Retry-After` hint from the
/// service overrides a shorter computed delay.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, VisionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VisionError>>,
{
    const MAX_DELAY_MS: u64 = 30_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let mut delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                if let VisionError::RateLimited { retry_after_secs } = &err {
                    delay_ms = delay_ms.max(retry_after_secs.saturating_mul(1000));
                }
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient vision error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
