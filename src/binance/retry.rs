// =============================================================================
// Retry Policy — transport-level retries with exponential backoff
// =============================================================================
//
// Binance answers overload with 429 (and occasionally 418 bans, which we do not
// retry) and flaky edges with 5xx.  The policy re-sends a request on connection
// failures, timeouts and the statuses in `RETRYABLE_STATUSES`, sleeping
//
//     backoff_factor * 2^(retry - 1)   seconds, capped at `MAX_BACKOFF`
//
// unless the server supplied a `Retry-After` header, which wins (bounded by
// `MAX_RETRY_AFTER`).  When the retries are spent the last response is handed
// back as-is so the caller can classify it.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use tracing::{debug, warn};

/// Statuses that are retried by the transport layer.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Upper bound for computed (not server-supplied) backoff delays.
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Upper bound for a server-supplied `Retry-After`.  Anything longer is
/// treated as this long; the attempt then fails over as usual.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Number of re-sends after the first try.
    pub retries: u32,
    /// Base delay in seconds for the exponential schedule.
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff_factor: f64) -> Self {
        Self {
            retries,
            backoff_factor: backoff_factor.max(0.0),
        }
    }

    /// A policy that never re-sends.
    pub fn none() -> Self {
        Self::new(0, 0.0)
    }

    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        RETRYABLE_STATUSES.contains(&status.as_u16())
    }

    fn is_retryable_error(&self, err: &reqwest::Error) -> bool {
        err.is_connect() || err.is_timeout() || err.is_request()
    }

    /// Computed delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let exp = 2f64.powi(retry.saturating_sub(1).min(30) as i32);
        let secs = self.backoff_factor * exp;
        Duration::from_secs_f64(secs.min(MAX_BACKOFF.as_secs_f64()))
    }

    /// Delay before retry number `retry`, preferring the server's hint.
    pub fn delay(&self, retry: u32, headers: Option<&HeaderMap>) -> Duration {
        headers
            .and_then(retry_after)
            .unwrap_or_else(|| self.backoff(retry))
    }

    /// Send the request produced by `make_request`, re-sending it according to
    /// the policy.  The final response is returned whatever its status.
    pub async fn send<F, Fut>(&self, make_request: F) -> Result<Response, reqwest::Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut retry = 0u32;
        loop {
            match make_request().await {
                Ok(resp) => {
                    let status = resp.status();
                    if retry >= self.retries || !self.is_retryable_status(status) {
                        return Ok(resp);
                    }
                    retry += 1;
                    let delay = self.delay(retry, Some(resp.headers()));
                    warn!(
                        url = %resp.url(),
                        %status,
                        retry,
                        max_retries = self.retries,
                        delay_ms = delay.as_millis() as u64,
                        "retryable status, backing off"
                    );
                    drop(resp);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if retry >= self.retries || !self.is_retryable_error(&err) {
                        return Err(err);
                    }
                    retry += 1;
                    let delay = self.backoff(retry);
                    debug!(
                        error = %err,
                        retry,
                        max_retries = self.retries,
                        delay_ms = delay.as_millis() as u64,
                        "transport error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 0.5)
    }
}

/// Parse a `Retry-After` header given either as delta-seconds or an HTTP date.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<f64>() {
        if secs < 0.0 {
            return None;
        }
        return Duration::try_from_secs_f64(secs)
            .ok()
            .map(|d| d.min(MAX_RETRY_AFTER));
    }

    let at: DateTime<Utc> = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let wait = at.signed_duration_since(Utc::now());
    Some(wait.to_std().unwrap_or(Duration::ZERO).min(MAX_RETRY_AFTER))
}
