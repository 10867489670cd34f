// Retry logic for marketplace API calls, honouring Retry-After hints
// Author: kelexine (https://github.com/kelexine)

use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;
use tracing::debug;

/// Attempts per operation, the first one included
const MAX_ATTEMPTS: u32 = 3;

/// Failed attempt: HTTP status (0 for transport errors), body, and the
/// server's `Retry-After` hint if it sent one.
#[derive(Debug, Clone)]
pub struct AttemptError {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

impl AttemptError {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }
}

/// Parse a `Retry-After` header given in seconds ("40", "1.5").
/// Returns the duration capped at 30 seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let capped_seconds = seconds.min(30.0);
    Some(Duration::from_millis((capped_seconds * 1000.0) as u64))
}

/// Create exponential backoff configuration for retries
pub fn create_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(200),     // Start at 200ms
        initial_interval: Duration::from_millis(200),
        randomization_factor: 0.3,                         // Add jitter
        multiplier: 2.0,                                  // Double each time
        max_interval: Duration::from_secs(5),
        max_elapsed_time: Some(Duration::from_secs(20)),
        ..Default::default()
    }
}

/// Determine if a failed attempt is worth repeating
pub fn is_retryable(status: u16) -> bool {
    matches!(status, 0 | 429 | 500 | 502 | 503 | 504)
}

/// Execute operation with retry logic
/// - Uses the server's Retry-After hint if available
/// - Falls back to exponential backoff
/// - Gives up after MAX_ATTEMPTS or on a non-retryable status
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    mut operation: F,
) -> Result<T, AttemptError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AttemptError>>,
{
    let mut backoff = create_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(err.status) || attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }

                let delay = match err.retry_after {
                    Some(hint) => hint,
                    None => match backoff.next_backoff() {
                        Some(delay) => delay,
                        None => return Err(err),
                    },
                };
                debug!(
                    "{} failed with {} (attempt {}), retrying after {}ms",
                    operation_name,
                    err.status,
                    attempt,
                    delay.as_millis()
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
