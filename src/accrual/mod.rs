//! HTTP client for the external accrual oracle, plus the shared rate-limit gate all callers of
//! a given client instance throttle against.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccrualOrderView {
    pub order: String,
    pub status: AccrualStatus,
    pub accrual: Option<rust_decimal::Decimal>,
}

#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    #[error("rate limited by accrual oracle")]
    RateLimited,
    #[error("accrual oracle returned malformed response")]
    Malformed,
    #[error("accrual oracle returned unexpected status {0}")]
    UpstreamStatus(u16),
    #[error("accrual oracle request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("accrual oracle request canceled")]
    Canceled,
}

/// `blocked`/`until` mutated together under one lock; `is_blocked` only reads.
struct RateLimiter {
    state: Mutex<(bool, Instant)>,
}

impl RateLimiter {
    fn new() -> Self {
        Self {
            state: Mutex::new((false, Instant::now())),
        }
    }

    fn is_blocked(&self) -> bool {
        let (blocked, until) = *self.state.lock().expect("rate limiter mutex poisoned");
        blocked && Instant::now() < until
    }

    fn block_for(&self, duration: Duration) {
        let mut guard = self.state.lock().expect("rate limiter mutex poisoned");
        *guard = (true, Instant::now() + duration);
    }
}

pub struct AccrualClient {
    base_url: String,
    http: reqwest::Client,
    limiter: RateLimiter,
}

impl AccrualClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build accrual http client"),
            limiter: RateLimiter::new(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.limiter.is_blocked()
    }

    pub async fn get_order(
        &self,
        order_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AccrualOrderView, AccrualError> {
        if self.limiter.is_blocked() {
            return Err(AccrualError::RateLimited);
        }

        let url = format!("{}/api/orders/{}", self.base_url.trim_end_matches('/'), order_id);
        let response = tokio::select! {
            result = self.http.get(&url).send() => result?,
            _ = cancel.cancelled() => return Err(AccrualError::Canceled),
        };

        match response.status().as_u16() {
            200 => response
                .json::<AccrualOrderView>()
                .await
                .map_err(|_| AccrualError::Malformed),
            204 => Err(AccrualError::UpstreamStatus(204)),
            429 => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                self.limiter.block_for(retry_after);
                Err(AccrualError::RateLimited)
            }
            code => Err(AccrualError::UpstreamStatus(code)),
        }
    }
}

/// Accepts either an integer seconds count or an HTTP-date (RFC 2822 form); anything else is
/// unparseable.
fn parse_retry_after(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let target = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let delta = target.with_timezone(&chrono::Utc) - chrono::Utc::now();
    delta.to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_retry_after() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn garbage_retry_after_is_none() {
        assert_eq!(parse_retry_after("not-a-date"), None);
    }

    #[test]
    fn fresh_limiter_is_not_blocked() {
        let limiter = RateLimiter::new();
        assert!(!limiter.is_blocked());
    }

    #[test]
    fn blocked_until_elapsed() {
        let limiter = RateLimiter::new();
        limiter.block_for(Duration::from_millis(50));
        assert!(limiter.is_blocked());
        std::thread::sleep(Duration::from_millis(60));
        assert!(!limiter.is_blocked());
    }
}
