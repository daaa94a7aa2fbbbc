use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::{ConfigError, ErrorKind, MeridianError};

/// Exponent cap for the backoff growth term. Past this point the schedule has
/// long since saturated at `max_delay_ms`, so larger counts gain nothing.
const MAX_BACKOFF_EXPONENT: u32 = 32;

type RetryPredicate = Arc<dyn Fn(&MeridianError) -> bool + Send + Sync>;

fn default_predicate() -> RetryPredicate {
    Arc::new(|error: &MeridianError| error.kind.is_transient())
}

/// Decides whether a failed attempt is retried and how long to wait first.
///
/// Delays follow `base_delay_ms * backoff_factor^n`, capped at `max_delay_ms`,
/// with uniform jitter of up to a tenth of the delay added on top so that
/// synchronized callers do not retry in lockstep. The parameters are checked
/// at construction; a built policy always produces positive, non-decreasing
/// delays.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    backoff_factor: f64,
    predicate: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("backoff_factor", &self.backoff_factor)
            .field("predicate", &"<predicate>")
            .finish()
    }
}

impl Default for RetryPolicy {
    /// Three retries, 250 ms base delay, 10 s cap, doubling between attempts.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            predicate: default_predicate(),
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from raw parameters, rejecting invariant violations.
    ///
    /// `base_delay_ms` must be positive, `max_delay_ms` at least as large,
    /// and `backoff_factor` a finite value of at least 1.
    pub fn new(
        max_retries: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        backoff_factor: f64,
    ) -> Result<Self, ConfigError> {
        if base_delay_ms == 0 {
            return Err(ConfigError::InvalidRetryPolicy(
                "base_delay_ms must be positive".to_owned(),
            ));
        }
        if max_delay_ms < base_delay_ms {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "max_delay_ms ({max_delay_ms}) must not be smaller than base_delay_ms ({base_delay_ms})"
            )));
        }
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "backoff_factor ({backoff_factor}) must be a finite value of at least 1"
            )));
        }
        Ok(Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_factor,
            predicate: default_predicate(),
        })
    }

    /// Policy that never retries; the connectivity probe runs under this.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 1,
            backoff_factor: 1.0,
            predicate: default_predicate(),
        }
    }

    /// Replaces the retry predicate, keeping the bounds and delays.
    ///
    /// The predicate decides whether a normalized error is worth another
    /// attempt. It can widen or narrow the default transient set but cannot
    /// lift the `max_retries` ceiling.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&MeridianError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Upper bound on retries per logical call.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the first retry, in milliseconds.
    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    /// Ceiling for computed delays, in milliseconds.
    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Multiplier applied to the delay after each retry.
    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Whether the attempt that failed with `error` should be retried.
    ///
    /// The ceiling is checked before the predicate, so no predicate can push
    /// a call past `max_retries`. `retry_count` is the number of retries
    /// already performed.
    pub fn should_retry(&self, error: &MeridianError, retry_count: u32) -> bool {
        if retry_count >= self.max_retries {
            return false;
        }
        (self.predicate)(error)
    }

    /// Delay to sleep before retry number `retry_count + 1`.
    ///
    /// A rate-limited response carrying `Retry-After` overrides the
    /// exponential schedule: the server's stated wait is authoritative and is
    /// used exactly, without jitter.
    pub fn delay_for(&self, retry_count: u32, error: &MeridianError) -> Duration {
        if error.kind == ErrorKind::RateLimited {
            if let Some(wait) = error.retry_after {
                return wait;
            }
        }

        let exponent = retry_count.min(MAX_BACKOFF_EXPONENT);
        let grown = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent as i32);
        let capped = if grown.is_finite() {
            (grown as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        };

        let jitter_range = capped / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped.saturating_add(jitter))
    }
}
