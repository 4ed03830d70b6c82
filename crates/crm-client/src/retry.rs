//! Retry with capped exponential backoff for transient CRM failures.

use std::future::Future;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use tracing::warn;

use crate::error::CrmError;

/// How transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    ///
    /// A server-supplied `retry-after` wins over the exponential schedule;
    /// both are capped at `max_delay`.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        retry_after.unwrap_or(exponential).min(self.max_delay)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Seconds form of `retry-after`. HTTP dates are ignored.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Send a request, retrying 429, 5xx and transport failures.
///
/// `send` builds and sends a fresh request per attempt. Other statuses,
/// including 401, are returned to the caller untouched.
pub async fn send_with_retry<F, Fut>(policy: &RetryPolicy, mut send: F) -> Result<Response, CrmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        let last = attempt >= policy.max_attempts;
        match send().await {
            Ok(response) if is_retryable_status(response.status()) && !last => {
                let delay = policy.delay(attempt, retry_after(&response));
                warn!(
                    status = response.status().as_u16(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "CRM call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(e) if !last && (e.is_timeout() || e.is_connect()) => {
                let delay = policy.delay(attempt, None);
                warn!(error = %e, attempt, "CRM transport error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(CrmError::Http(e)),
        }
        attempt += 1;
    }
}
