//! Transport-level retry policy, applied per URL scheme.
//!
//! Only failures where the request never reached the server are retried
//! ([`FailureType::Connect`]). Timeouts and HTTP error statuses surface to the
//! caller on the first occurrence; callers that want more than that layer
//! their own retries above the executor.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use fetcher_core::request::{FailureType, RetryDecision, SchemeRetryPolicy};
//!
//! let policies = SchemeRetryPolicy::uniform(3, Duration::from_millis(100));
//! let https = policies.for_scheme("https").expect("https is covered");
//!
//! match https.should_retry(FailureType::Connect, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

/// Default retries per scheme, on top of the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default maximum delay cap (8 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (50ms).
const MAX_JITTER: Duration = Duration::from_millis(50);

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Connection could not be established; the request was never sent.
    Connect,

    /// The exchange exceeded its timeout.
    Timeout,

    /// Anything else (TLS, protocol, body decode, redirect loop...).
    Other,
}

/// Decision on whether to re-attempt a failed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up and surface the error.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry behavior for a single scheme.
///
/// With `max_retries = 3` an exchange is attempted at most four times.
/// Delays follow `min(base_delay * multiplier^(attempt-1), max_delay) + jitter`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(crate::config::DEFAULT_RETRY_BASE_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    /// Creates a policy with the given retry count and base delay.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: DEFAULT_MAX_DELAY.max(base_delay),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Returns the configured retry count.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides what to do after `attempt` (1-indexed) failed with `failure_type`.
    #[instrument(skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Timeout => {
                return RetryDecision::DoNotRetry {
                    reason: "timeout - the request may already have been processed".to_string(),
                };
            }
            FailureType::Other => {
                return RetryDecision::DoNotRetry {
                    reason: "non-connect failure - retry would not help".to_string(),
                };
            }
            FailureType::Connect => {}
        }

        if attempt > self.max_retries {
            debug!(attempt, max = self.max_retries, "retries exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as f64;
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * f64::from(self.backoff_multiplier).powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter_ms = rand::thread_rng().gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(capped_ms as u64) + Duration::from_millis(jitter_ms)
    }
}

/// Retry policies mounted per scheme, mirroring one adapter for `http://` and
/// one for `https://`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeRetryPolicy {
    http: RetryPolicy,
    https: RetryPolicy,
}

impl Default for SchemeRetryPolicy {
    fn default() -> Self {
        Self {
            http: RetryPolicy::default(),
            https: RetryPolicy::default(),
        }
    }
}

impl SchemeRetryPolicy {
    /// Same policy for both schemes.
    #[must_use]
    pub fn uniform(max_retries: u32, base_delay: Duration) -> Self {
        let policy = RetryPolicy::new(max_retries, base_delay);
        Self {
            http: policy.clone(),
            https: policy,
        }
    }

    /// Distinct policies per scheme.
    #[must_use]
    pub fn new(http: RetryPolicy, https: RetryPolicy) -> Self {
        Self { http, https }
    }

    /// Policy for `scheme`, or `None` for schemes without a mounted policy.
    #[must_use]
    pub fn for_scheme(&self, scheme: &str) -> Option<&RetryPolicy> {
        if scheme.eq_ignore_ascii_case("https") {
            Some(&self.https)
        } else if scheme.eq_ignore_ascii_case("http") {
            Some(&self.http)
        } else {
            None
        }
    }
}

/// Classifies a reqwest error for retry purposes.
#[must_use]
pub fn classify_error(error: &reqwest::Error) -> FailureType {
    if error.is_timeout() {
        FailureType::Timeout
    } else if error.is_connect() {
        FailureType::Connect
    } else {
        FailureType::Other
    }
}
