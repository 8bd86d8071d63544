//! Retry logic with exponential backoff for transient extraction failures.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying extraction errors and determining retry behavior, plus the
//! [`with_retry`] / [`retry_with_policy`] wrappers that drive a backend or
//! analyzer call through the policy.
//!
//! # Overview
//!
//! When a call fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//! - [`FailureType::NeedsAuth`] - Credentials missing or rejected
//! - [`FailureType::RateLimited`] - Platform throttling (retries with backoff)
//!
//! The [`RetryPolicy`] then determines whether to retry based on failure type
//! and attempt count. A server-provided `Retry-After` wins over the computed
//! backoff.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sns_downloader_core::backend::ExtractError;
//! use sns_downloader_core::download::{FailureType, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = ExtractError::timeout("yt-dlp", Duration::from_secs(30));
//! assert_eq!(classify_error(&error), FailureType::Transient);
//!
//! match policy.should_retry(classify_error(&error), 1, None) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use crate::backend::{Backend, ExtractError, ExtractionResult};
use crate::parser::ContentReference;

/// Default maximum attempts (including the first).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Upper bound for a server-provided Retry-After (1 hour).
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Classification of extraction failure types.
///
/// Used to determine whether a failed call should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: call timeout, connection reset, 5xx responses.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: private account, removed content, changed page structure.
    Permanent,

    /// Credentials missing, expired or rejected.
    NeedsAuth,

    /// Platform rate limiting (HTTP 429 or tool-reported throttling).
    RateLimited,
}

/// Decision on whether to retry a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
/// - `max_jitter`: 500ms
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
///
/// With defaults, delays are approximately: 1s, 2s, 4s (before hitting max attempts).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt (typically 2.0 for doubling).
    backoff_multiplier: f32,

    /// Upper bound of the random jitter; zero disables it.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (must be >= 1)
    /// * `base_delay` - Base delay for first retry
    /// * `max_delay` - Maximum delay cap
    /// * `backoff_multiplier` - Multiplier for exponential increase
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter: MAX_JITTER,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replaces the base delay.
    #[must_use]
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Replaces the jitter bound; `Duration::ZERO` makes delays deterministic.
    #[must_use]
    pub fn jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry a failed call.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    /// * `server_delay` - Wait requested by the server, which takes precedence
    ///   over the computed backoff
    ///
    /// # Returns
    ///
    /// A [`RetryDecision`] indicating whether to retry and with what delay.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(
        &self,
        failure_type: FailureType,
        attempt: u32,
        server_delay: Option<Duration>,
    ) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "authentication problem - retry with the same credentials would not help"
                        .to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = match server_delay {
            Some(requested) => requested.min(MAX_RETRY_AFTER),
            None => self.calculate_delay(attempt),
        };

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            server_requested = server_delay.is_some(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Calculates the delay for a retry attempt with exponential backoff and jitter.
    ///
    /// Formula: `min(base_delay * multiplier^(attempt-1), max_delay) + jitter`
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        // attempt 1 = 2^0 = 1x base
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    /// Generates random jitter between 0 and `max_jitter`.
    ///
    /// Jitter helps prevent thundering herd when several requests are
    /// throttled at the same time.
    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

/// Classifies an extraction error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | `RateLimited` | RateLimited |
/// | `Timeout`, `Network` | Transient |
/// | `HttpStatus` 408 / 5xx | Transient |
/// | `HttpStatus` other | Permanent |
/// | `Authentication` | NeedsAuth |
/// | `PrivateAccount`, `ContentNotFound`, `BackendStructure`, `AnalysisUnavailable`, `Tool`, `Io`, `DownloadFailed` | Permanent |
#[must_use]
pub fn classify_error(error: &ExtractError) -> FailureType {
    match error {
        ExtractError::RateLimited { .. } => FailureType::RateLimited,
        ExtractError::Timeout { .. } | ExtractError::Network { .. } => FailureType::Transient,
        ExtractError::HttpStatus { status, .. } => classify_http_status(*status),
        ExtractError::Authentication { .. } => FailureType::NeedsAuth,
        ExtractError::PrivateAccount { .. }
        | ExtractError::ContentNotFound { .. }
        | ExtractError::BackendStructure { .. }
        | ExtractError::AnalysisUnavailable { .. }
        | ExtractError::Tool { .. }
        | ExtractError::Io { .. }
        | ExtractError::DownloadFailed { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code that was not mapped to a more specific error.
#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        401 | 403 => FailureType::NeedsAuth,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Server-requested wait carried by an error, if any.
#[must_use]
pub fn server_retry_after(error: &ExtractError) -> Option<Duration> {
    match error {
        ExtractError::RateLimited { retry_after, .. } => *retry_after,
        _ => None,
    }
}

/// Parses a `Retry-After` header value into a duration.
///
/// Accepts delta-seconds (`"120"`) or an HTTP-date. Negative values, past
/// dates and garbage yield `None`; values above one hour are capped.
///
/// ```
/// use std::time::Duration;
/// use sns_downloader_core::download::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        return match datetime.duration_since(std::time::SystemTime::now()) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            Err(_) => {
                debug!(header_value, "Retry-After date is in the past, ignoring");
                None
            }
        };
    }

    debug!(header_value, "unparseable Retry-After value");
    None
}

/// Runs `operation` under `policy`, bounding each attempt by `call_timeout`.
///
/// `operation` receives the 1-based attempt number. An attempt that exceeds
/// `call_timeout` counts as a transient [`ExtractError::Timeout`].
///
/// # Errors
///
/// - permanent and auth errors are returned unchanged, without retrying
/// - when retryable errors exhaust the policy, [`ExtractError::DownloadFailed`]
///   wraps the last one
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    call_timeout: Duration,
    mut operation: F,
) -> Result<T, ExtractError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let mut attempt: u32 = 1;
    loop {
        let error = match tokio::time::timeout(call_timeout, operation(attempt)).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(error)) => error,
            Err(_) => ExtractError::timeout(label, call_timeout),
        };

        let failure_type = classify_error(&error);
        match policy.should_retry(failure_type, attempt, server_retry_after(&error)) {
            RetryDecision::Retry {
                delay,
                attempt: next,
            } => {
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt = next;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(label, attempt, reason = %reason, "not retrying");
                return match failure_type {
                    FailureType::Transient | FailureType::RateLimited => {
                        Err(ExtractError::DownloadFailed {
                            attempts: attempt,
                            last: Box::new(error),
                        })
                    }
                    FailureType::Permanent | FailureType::NeedsAuth => Err(error),
                };
            }
        }
    }
}

/// Fetches `reference` through `backend` with retries.
///
/// # Errors
///
/// See [`retry_with_policy`].
pub async fn with_retry(
    backend: &dyn Backend,
    reference: &ContentReference,
    policy: &RetryPolicy,
    call_timeout: Duration,
) -> Result<ExtractionResult, ExtractError> {
    retry_with_policy(policy, backend.name(), call_timeout, |_| {
        backend.fetch(reference)
    })
    .await
}
