//! Reconnection Policy
//!
//! Backoff policy for WebSocket reconnection. The backoff mode is
//! configurable: a fixed interval bounds reconnection latency, exponential
//! backoff with jitter avoids hammering a struggling upstream.

use std::time::Duration;

use rand::Rng;

/// Backoff growth mode between reconnection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffMode {
    /// Every attempt waits `initial_delay`.
    Fixed,
    /// Delay grows by `multiplier` per attempt, capped at `max_delay`.
    #[default]
    Exponential,
}

impl BackoffMode {
    /// Parse mode from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fixed" => Self::Fixed,
            _ => Self::Exponential,
        }
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
        }
    }
}

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff growth mode.
    pub mode: BackoffMode,
    /// Delay before the first reconnection attempt (and every attempt in
    /// fixed mode).
    pub initial_delay: Duration,
    /// Maximum delay between attempts in exponential mode.
    pub max_delay: Duration,
    /// Multiplier per attempt in exponential mode.
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g. 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            mode: BackoffMode::Exponential,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0, // Unlimited
        }
    }
}

impl ReconnectConfig {
    /// Fixed-interval configuration.
    #[must_use]
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            mode: BackoffMode::Fixed,
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }
}

/// Reconnection policy producing the delay before each attempt.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Get the delay before the next attempt.
    ///
    /// Returns `None` once the attempt budget is exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        self.attempt_count += 1;

        let delay = self.apply_jitter(self.current_delay);

        if self.config.mode == BackoffMode::Exponential {
            self.current_delay = self.scaled_next_delay();
        }

        Some(delay)
    }

    /// Reset the policy after a successful connection or a manual
    /// reconnect request.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Next base delay in exponential mode, capped at `max_delay`.
    fn scaled_next_delay(&self) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
