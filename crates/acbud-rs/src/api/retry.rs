//! Bounded retry with exponential backoff and jitter.
//!
//! Retries transient failures (429, 500, 502, 503, 504, network errors,
//! timeouts) a fixed number of times. Never retries 400 (bad request), 401
//! (auth) or malformed responses. The default is zero retries: one call, one
//! timeout, one answer.

use std::time::Duration;

use crate::error::ModelCallError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
const PERMANENT_STATUSES: [u16; 5] = [400, 401, 403, 404, 422];

/// Whether an error is a transient (retryable) failure.
pub fn is_transient(error: &ModelCallError) -> bool {
    match error {
        ModelCallError::Http { status, .. } => TRANSIENT_STATUSES.contains(status),
        ModelCallError::Network(_) | ModelCallError::Timeout(_) => true,
        ModelCallError::Api(message) => {
            let lower = message.to_lowercase();
            ["overloaded", "rate limit", "timeout", "temporarily"]
                .iter()
                .any(|p| lower.contains(p))
        }
        ModelCallError::MissingCredentials(_)
        | ModelCallError::Malformed(_)
        | ModelCallError::Empty => false,
    }
}

/// Whether an error is a permanent (non-retryable) failure.
pub fn is_permanent(error: &ModelCallError) -> bool {
    match error {
        ModelCallError::Http { status, .. } => PERMANENT_STATUSES.contains(status),
        ModelCallError::MissingCredentials(_) | ModelCallError::Malformed(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ModelCallError {
        ModelCallError::Http {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn default_config_no_retries() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn with_retries_sets_count() {
        let config = RetryConfig::with_retries(3);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(5)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);

        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
    }

    #[test]
    fn jitter_reduces_delay() {
        let jittered = RetryConfig::with_retries(3);
        let plain = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(3)
        };
        assert!(jittered.delay_for_attempt(2) <= plain.delay_for_attempt(2));
    }

    #[test]
    fn transient_errors_detected() {
        assert!(is_transient(&http(429)));
        assert!(is_transient(&http(502)));
        assert!(is_transient(&ModelCallError::Network("connection reset".into())));
        assert!(is_transient(&ModelCallError::Timeout(Duration::from_secs(1))));
        assert!(is_transient(&ModelCallError::Api("Provider overloaded".into())));
    }

    #[test]
    fn permanent_errors_detected() {
        assert!(is_permanent(&http(400)));
        assert!(is_permanent(&http(401)));
        assert!(is_permanent(&ModelCallError::Malformed("eof".into())));
    }

    #[test]
    fn non_transient_not_retried() {
        assert!(!is_transient(&http(400)));
        assert!(!is_transient(&ModelCallError::Empty));
        assert!(!is_transient(&ModelCallError::Api("invalid model".into())));
    }
}
