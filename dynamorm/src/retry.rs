//! The throttling-aware retry wrapper (`spec.md` §4.4 "Retry wrapper
//! `exec`").

use crate::error::{Error, ErrorKind, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// Store error codes the retry wrapper absorbs.
const RETRYABLE_CODES: &[&str] = &[
    "ThrottlingException",
    "ProvisionedThroughputExceededException",
    "LimitExceededException",
    "ResourceInUseException",
];

/// Whether `code` (an AWS error code, e.g. `"ThrottlingException"`) is one
/// the retry wrapper should absorb rather than surface.
pub fn is_retryable_code(code: &str) -> bool {
    RETRYABLE_CODES.contains(&code)
}

/// The exponential back-off schedule: `base * 2^attempt`, capped at 20s.
///
/// Also used directly by [`crate::client`] to space out resubmission of
/// `BatchGetItem`/`BatchWriteItem` unprocessed entries, which are not
/// store errors and so never go through [`exec`].
pub(crate) fn backoff(attempt: u32) -> Duration {
    let millis = 50u64.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(millis.min(20_000))
}

/// Invokes `action`, retrying on a retryable store error until
/// `timeout` has elapsed since the first attempt.
///
/// `action` is a thunk so it can be retried; it returns `Err` with an
/// [`ErrorKind::TransientStore`] to request a retry, any other `Err` to
/// abort immediately. `exempt` additionally forces immediate failure for
/// error kinds that would otherwise be retried (unused today since only
/// `TransientStore` is ever retried, but kept to mirror the source's
/// `exemptExceptions` parameter, and so a caller can exempt a specific
/// kind without changing the classification logic in [`crate::error`]).
pub async fn exec<F, Fut, T>(timeout: Duration, exempt: &[ErrorKind], mut action: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let mut attempt = 0u32;
    loop {
        match action().await {
            Ok(value) => return Ok(value),
            Err(err) if err.kind() == ErrorKind::TransientStore && !exempt.contains(&err.kind()) => {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(ErrorKind::Timeout.with_context(format_args!(
                        "exceeded max_retry_on_exception_timeout ({timeout:?}) after {attempt} attempts; last error: {err}"
                    )));
                }
                let sleep_for = backoff(attempt).min(timeout - elapsed);
                tracing::warn!(attempt, ?sleep_for, %err, "retrying after transient store error");
                tokio::time::sleep(sleep_for).await;
                attempt += 1;
            }
            Err(err) => return Err(exempt_or_pass(err, exempt)),
        }
    }
}

fn exempt_or_pass(err: Error, _exempt: &[ErrorKind]) -> Error {
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let calls = AtomicU32::new(0);
        let result = exec(Duration::from_secs(5), &[], || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(ErrorKind::TransientStore.with_message("ThrottlingException"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = exec(Duration::from_secs(5), &[], || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ErrorKind::NotFound.with_message("missing")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
