//! Retry policy for assistant calls.
//!
//! Each call is retried on connection failures and on the transient statuses
//! 408, 429, 502, 503 and 504. Delays grow exponentially from
//! `initial_delay`, are capped at `max_delay`, and are reduced by a random
//! down-jitter of up to `jitter_factor`. A server-provided `Retry-After` or
//! `Retry-After-Ms` inside (0, 60s) takes precedence over the computed delay.
//!
//! Every attempt carries the same `Idempotency-Key` and an
//! `X-Onpoint-Attempt` counter (0 for the first attempt).

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use uuid::Uuid;

pub const ATTEMPT_HEADER: &str = "X-Onpoint-Attempt";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const RETRY_AFTER_CEILING: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay that may be randomly shaved off (0.25 = 25%).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no backoff.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

fn within_ceiling(delay: Duration) -> Option<Duration> {
    (delay > Duration::ZERO && delay < RETRY_AFTER_CEILING).then_some(delay)
}

/// Server-requested delay from `Retry-After-Ms` (float millis) or
/// `Retry-After` (integer seconds). Out-of-range values are ignored.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let from_ms = header("retry-after-ms")
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .and_then(|ms| within_ceiling(Duration::from_secs_f64(ms / 1000.0)));
    if from_ms.is_some() {
        return from_ms;
    }

    header("retry-after")
        .and_then(|s| s.trim().parse::<u64>().ok())
        .and_then(|secs| within_ceiling(Duration::from_secs(secs)))
}

#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 502 | 503 | 504)
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

/// Delay before retry number `retry` (0-based).
#[must_use]
pub fn backoff_delay(retry: u32, config: &RetryConfig, headers: Option<&HeaderMap>) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after) {
        return delay;
    }

    let exponent = retry.min(30) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor.clamp(0.0, 1.0);
    Duration::from_secs_f64(capped * jitter)
}

#[must_use]
pub fn new_idempotency_key() -> String {
    format!("onpoint-{}", Uuid::new_v4())
}

/// Result of [`send_with_retry`] once retries are exhausted or unnecessary.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Final non-2xx response, kept for status and body inspection.
    Status(Response),
    /// Transport failure on the final attempt.
    Transport { attempts: u32, source: reqwest::Error },
}

/// Send the request built by `build_request`, retrying per `config`.
///
/// `build_request` is invoked once per attempt.
pub async fn send_with_retry<F>(build_request: F, config: &RetryConfig) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let key = new_idempotency_key();
    let mut attempt: u32 = 0;

    loop {
        let can_retry = attempt < config.max_retries;
        let request = build_request()
            .header(IDEMPOTENCY_HEADER, key.as_str())
            .header(ATTEMPT_HEADER, attempt.to_string());

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                return RetryOutcome::Success(response);
            }
            Ok(response) => {
                let status = response.status();
                if !(can_retry && is_retryable_status(status)) {
                    return RetryOutcome::Status(response);
                }
                let delay = backoff_delay(attempt, config, Some(response.headers()));
                tracing::debug!(
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying assistant call after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if !(can_retry && is_retryable_error(&err)) {
                    return RetryOutcome::Transport {
                        attempts: attempt + 1,
                        source: err,
                    };
                }
                let delay = backoff_delay(attempt, config, None);
                tracing::debug!(
                    error = %err,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying assistant call after transport error"
                );
                tokio::time::sleep(delay).await;
            }
        }

        attempt += 1;
    }
}
