use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs `operation` until it succeeds or `max_attempts` is exhausted.
///
/// The pause before attempt `n + 1` is `delay * n`, so waits grow linearly.
/// A `max_attempts` of zero is treated as one. The last error is returned
/// unchanged.
pub async fn retry_operation<T, E, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                let wait = delay * attempt;
                warn!(
                    "Attempt {}/{} failed: {} - retrying in {}ms",
                    attempt,
                    max_attempts,
                    e,
                    wait.as_millis()
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
