//! Failure isolation for outbound sends.
//!
//! After sustained failure the breaker suppresses send attempts for a
//! cooldown window. It is a lazily-evaluated predicate over two fields, not
//! a state machine with a background timer: the circuit is "open" exactly
//! while `opened_at` is set and younger than the cooldown, and the first
//! [`is_open`](CircuitBreaker::is_open) check after the cooldown elapses
//! resets both fields, giving the next send attempt a fresh trial. The
//! relay's pending-flush cap keeps the number of probes after a reset
//! small.

use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a check closes it again.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Consecutive-failure circuit breaker with check-time reset.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// Checks whether sends are currently suppressed.
    ///
    /// A check that finds the cooldown expired closes the circuit and
    /// resets the failure count, so the caller is allowed to probe.
    pub fn is_open(&mut self) -> bool {
        match self.opened_at {
            Some(opened) if opened.elapsed() > self.config.cooldown() => {
                self.opened_at = None;
                self.consecutive_failures = 0;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// A single success clears the failure count unconditionally; there is
    /// no gradual decay.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Records one failed send. The circuit opens the moment the count
    /// reaches the threshold. Late failures from sends that were already in
    /// flight when the circuit opened do not refresh `opened_at`.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.opened_at.is_none() && self.consecutive_failures >= self.config.failure_threshold {
            self.opened_at = Some(Instant::now());
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown_secs,
        })
    }

    #[tokio::test]
    async fn test_opens_at_threshold() {
        let mut cb = breaker(5, 60);

        for _ in 0..4 {
            cb.record_failure();
            assert!(!cb.is_open());
        }
        cb.record_failure();
        assert!(cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_open_within_cooldown() {
        let mut cb = breaker(5, 60);
        for _ in 0..5 {
            cb.record_failure();
        }

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_lazily_after_cooldown() {
        let mut cb = breaker(5, 60);
        for _ in 0..5 {
            cb.record_failure();
        }
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_secs(61)).await;

        // The check itself performs the reset.
        assert!(!cb.is_open());
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_success_resets_unconditionally() {
        let mut cb = breaker(5, 60);

        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);

        // A fresh run of failures is needed to open.
        for _ in 0..4 {
            cb.record_failure();
        }
        assert!(!cb.is_open());
        cb.record_failure();
        assert!(cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failures_do_not_extend_the_window() {
        let mut cb = breaker(5, 60);
        for _ in 0..5 {
            cb.record_failure();
        }

        tokio::time::advance(Duration::from_secs(59)).await;
        // A send that was in flight when the circuit opened reports late.
        cb.record_failure();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cb.is_open());
    }
}
