//! Fixed-count retry for remote calls.
//!
//! Transient remote failures are retried immediately, without backoff, up
//! to [`DEFAULT_ATTEMPTS`] attempts in total. The last error is returned once
//! attempts run out. Definitive errors (see [`PolarionError::is_transient`])
//! are returned on first sight.

use std::future::Future;

use tracing::warn;

use crate::polarion::{PolarionError, PolarionResult};
use crate::profile_log;

/// Total attempts made for a remote call, the first one included.
pub const DEFAULT_ATTEMPTS: usize = 3;

/// Run `op` until it succeeds, fails definitively, or `attempts` are used up.
///
/// `attempts` is clamped to at least one.
pub async fn with_retries<T, F, Fut>(label: &str, attempts: usize, mut op: F) -> PolarionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PolarionResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    profile_log!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(err) if should_retry(&err, attempt, attempts) => {
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying",
                    label, attempt, attempts, err
                );
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// [`with_retries`] with [`DEFAULT_ATTEMPTS`].
pub async fn retry<T, F, Fut>(label: &str, op: F) -> PolarionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PolarionResult<T>>,
{
    with_retries(label, DEFAULT_ATTEMPTS, op).await
}

/// Whether an error is worth another attempt.
pub fn should_retry(err: &PolarionError, attempt: usize, attempts: usize) -> bool {
    err.is_transient() && attempt < attempts
}
