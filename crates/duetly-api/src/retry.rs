// Retry and backoff policy
//
// Pure decision functions. The transport consults `RetryPolicy` after every
// failed request; the sync engine consults `ReconnectPolicy` between
// reconnection attempts. Neither touches the network.

use std::time::Duration;

use crate::error::Error;

// ── RetryPolicy ──────────────────────────────────────────────────────

/// Per-request retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt. Default: 2.
    pub max_retries: u32,
    /// Pause before a retried request. Default: none.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::ZERO,
        }
    }
}

/// What to do after a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Issue the same request again after `delay`.
    Retry { delay: Duration },
    /// Re-perform the login handshake, then retry exactly once more.
    Relogin,
    /// Surface the error to the caller.
    GiveUp,
}

impl RetryPolicy {
    /// Decide whether a request that failed with `err` should be retried.
    ///
    /// `retries` is the number of retries already issued for this request,
    /// `relogged` whether the one permitted re-login has been spent.
    pub fn decide(&self, retries: u32, err: &Error, relogged: bool) -> RetryDecision {
        if err.is_auth_failure() {
            return if relogged {
                RetryDecision::GiveUp
            } else {
                RetryDecision::Relogin
            };
        }
        if err.is_transient() && retries < self.max_retries {
            return RetryDecision::Retry {
                delay: self.retry_delay,
            };
        }
        RetryDecision::GiveUp
    }

    /// Timeout for a single request once a session is live.
    ///
    /// One request plus all of its retries must fit inside the controller's
    /// session expiry.
    pub fn request_timeout(&self, session_timeout: Duration) -> Duration {
        session_timeout / (self.max_retries + 1)
    }

    /// Timeout for the `retries`-th retry once `elapsed` of the session
    /// budget is spent: what remains, split over the attempts still allowed.
    pub fn retry_timeout(
        &self,
        session_timeout: Duration,
        elapsed: Duration,
        retries: u32,
    ) -> Duration {
        let attempts_left = (self.max_retries + 1).saturating_sub(retries).max(1);
        session_timeout.saturating_sub(elapsed) / attempts_left
    }
}

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// Exponential backoff configuration for session re-establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the second reconnection attempt. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
    /// Maximum reconnection attempts before giving up.
    /// `None` means retry until success or an explicit disconnect.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Exponential backoff with jitter.
    ///
    /// `delay = min(initial * 2^attempt, max) + jitter`, jitter within +-25%.
    pub fn backoff(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_possible_wrap, clippy::as_conversions)]
        let exp = attempt.min(16) as i32;
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exp);
        let capped = base.min(self.max_delay.as_secs_f64());

        // Deterministic jitter seeded from the attempt number.
        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        let with_jitter = (capped * jitter_factor).max(0.0);

        Duration::from_secs_f64(with_jitter)
    }
}
