//! The JSON-over-HTTP request primitive shared by the vendor API clients.
//!
//! Both upstream APIs rate-limit aggressively and drop connections under load, so every
//! call goes through [`send_value`] / [`send_json`], which retry on HTTP 429 (honouring
//! `Retry-After`), on 502/503/504, and on connect/read timeouts, with capped exponential
//! backoff. Any other 4xx surfaces immediately as [`HttpError::Status`].

use std::time::Duration;

use log::*;
use rand::Rng;
use reqwest::{header::RETRY_AFTER, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Could not deserialize response from {url}: {message}")]
    Json { url: String, message: String },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4, base_delay: Duration::from_millis(500), max_delay: Duration::from_secs(15) }
    }
}

impl RetryPolicy {
    /// The delay before retry number `attempt` (1-based). A server-supplied `Retry-After`
    /// takes precedence over the exponential schedule; both are capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = match retry_after {
            Some(d) => d,
            None => self.base_delay.saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16)),
        };
        backoff.min(self.max_delay)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503 | 504)
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..250))
}

/// Sends the request and returns the response body as a raw [`Value`].
///
/// An empty body (typical for DELETE) comes back as `Value::Null`. The builder must be
/// cloneable (no streaming body), which holds for every JSON request this workspace makes.
pub async fn send_value(builder: RequestBuilder, policy: &RetryPolicy) -> Result<Value, HttpError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let request = builder
            .try_clone()
            .ok_or_else(|| HttpError::Transport("request body is not cloneable, cannot send".to_string()))?;
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                if retryable && attempt < policy.max_attempts {
                    let delay = policy.delay_for(attempt, None) + jitter();
                    warn!("🌐️ attempt {attempt}/{} failed ({e}), retrying in {delay:?}", policy.max_attempts);
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(HttpError::Transport(e.to_string()));
            },
        };
        let status = response.status();
        let url = response.url().to_string();
        if status.is_success() {
            let text = response.text().await.map_err(|e| HttpError::Transport(e.to_string()))?;
            if text.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str::<Value>(&text).or(Ok(Value::String(text)));
        }
        if is_retryable_status(status) && attempt < policy.max_attempts {
            let retry_after = retry_after_header(&response);
            let delay = policy.delay_for(attempt, retry_after) + jitter();
            warn!(
                "🌐️ HTTP {status} from {url}, attempt {attempt}/{}, retrying in {delay:?}",
                policy.max_attempts
            );
            tokio::time::sleep(delay).await;
            continue;
        }
        let body = response.text().await.unwrap_or_default();
        return Err(HttpError::Status { status: status.as_u16(), url, body });
    }
}

/// Sends the request and deserializes the response body into `T`.
pub async fn send_json<T: DeserializeOwned>(builder: RequestBuilder, policy: &RetryPolicy) -> Result<T, HttpError> {
    let url = builder
        .try_clone()
        .and_then(|b| b.build().ok())
        .map(|r| r.url().to_string())
        .unwrap_or_default();
    let value = send_value(builder, policy).await?;
    serde_json::from_value(value).map_err(|e| HttpError::Json { url, message: e.to_string() })
}

/// Sends a request whose response body is irrelevant (DELETE and friends).
pub async fn send_no_content(builder: RequestBuilder, policy: &RetryPolicy) -> Result<(), HttpError> {
    send_value(builder, policy).await.map(|_| ())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for code in [429u16, 502, 503, 504] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()), "{code} should retry");
        }
        for code in [400u16, 401, 403, 404, 409, 412, 500] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()), "{code} should not retry");
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_attempts: 6, base_delay: Duration::from_secs(2), max_delay: Duration::from_secs(15) };
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(8));
        // 2 * 2^3 = 16s exceeds the cap
        assert_eq!(policy.delay_for(4, None), Duration::from_secs(15));
    }

    #[test]
    fn retry_after_takes_precedence() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, Some(Duration::from_secs(7))), Duration::from_secs(7));
        // but it is still capped
        assert_eq!(policy.delay_for(1, Some(Duration::from_secs(120))), policy.max_delay);
    }
}
