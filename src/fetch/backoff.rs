//! Retry policy and backoff calculation

use crate::config::RetryConfig;
use crate::fetch::outcome::FetchOutcome;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

/// How a logical fetch retries
///
/// `max_attempts` is always at least 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_enabled: bool,

    /// Extra factor applied to the delay after a given HTTP status
    pub status_code_multipliers: HashMap<u16, f64>,

    /// Minimum wait after an HTTP 429, before the policy backoff
    pub rate_limit_floor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let mut status_code_multipliers = HashMap::new();
        status_code_multipliers.insert(403, 3.0);

        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_enabled: true,
            status_code_multipliers,
            rate_limit_floor: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from its configuration section
    ///
    /// Keys of `status-multipliers` that do not parse as status codes are
    /// skipped; validation rejects them before this point.
    pub fn from_config(config: &RetryConfig) -> Self {
        let status_code_multipliers = config
            .status_multipliers
            .iter()
            .filter_map(|(code, factor)| code.parse::<u16>().ok().map(|c| (c, *factor)))
            .collect();

        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter_enabled: config.jitter,
            status_code_multipliers,
            rate_limit_floor: Duration::from_millis(config.rate_limit_floor_ms),
        }
    }

    /// Returns a copy of the policy with a different attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns a copy of the policy without jitter
    pub fn without_jitter(mut self) -> Self {
        self.jitter_enabled = false;
        self
    }
}

/// Computes the delay before the next attempt
///
/// `min(base_delay * multiplier^attempt, max_delay)`, scaled by a uniform
/// factor in `[0.5, 1.0]` when jitter is enabled.
pub fn delay<R: Rng + ?Sized>(attempt: u32, policy: &RetryPolicy, rng: &mut R) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = policy.base_delay.as_secs_f64() * policy.multiplier.powi(exponent);
    let capped = if raw.is_finite() {
        raw.min(policy.max_delay.as_secs_f64())
    } else {
        policy.max_delay.as_secs_f64()
    };

    let scaled = if policy.jitter_enabled {
        capped * rng.gen_range(0.5..=1.0)
    } else {
        capped
    };

    Duration::from_secs_f64(scaled.max(0.0))
}

/// Computes the delay after a classified outcome
///
/// Applies the status-code multiplier (403 is steep by default), the
/// rate-limit floor for 429, and never waits less than a server hint.
pub fn delay_for_outcome<R: Rng + ?Sized>(
    attempt: u32,
    outcome: &FetchOutcome,
    policy: &RetryPolicy,
    rng: &mut R,
) -> Duration {
    let mut wait = delay(attempt, policy, rng);

    if let Some(code) = outcome.status_code() {
        if let Some(factor) = policy.status_code_multipliers.get(&code) {
            wait = scale_saturating(wait, *factor);
        }
    }

    if let FetchOutcome::RateLimited { retry_after, .. } = outcome {
        wait = wait.saturating_add(policy.rate_limit_floor);
        if let Some(hint) = retry_after {
            wait = wait.max(*hint);
        }
    }

    wait
}

/// Multiplies a duration, saturating instead of panicking
///
/// NaN and non-positive factors yield zero; overflow saturates.
fn scale_saturating(wait: Duration, factor: f64) -> Duration {
    let secs = wait.as_secs_f64() * factor;
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Decides whether another attempt should follow
///
/// False once `attempt >= max_attempts` and for successes or permanent
/// failures; true for blocked, rate-limited, transient and retryable
/// transport outcomes.
pub fn should_retry(outcome: &FetchOutcome, attempt: u32, policy: &RetryPolicy) -> bool {
    if attempt >= policy.max_attempts {
        return false;
    }

    match outcome {
        FetchOutcome::Success { .. } => false,
        FetchOutcome::Blocked { .. }
        | FetchOutcome::RateLimited { .. }
        | FetchOutcome::TransientError { .. } => true,
        FetchOutcome::TransportFailure { permanent, .. } => !permanent,
    }
}
