//! Connect retry budget with exponential backoff.
//!
//! [`RetryState`] counts failed connect attempts against the budget of the
//! current connect request and decides when the next automatic attempt is
//! due. Delays grow exponentially from [`ReconnectConfig::initial_delay`],
//! capped at [`ReconnectConfig::max_delay`], with optional jitter so a fleet of
//! clients does not hammer a recovering server in lockstep.

use std::time::{Duration, Instant};

use rand::Rng;

/// Backoff shape for automatic connect retries.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first automatic retry. Default: 1 s.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Maximum delay between attempts. Default: 30 s.
    pub max_delay: Duration,
    /// Jitter factor (0.0–1.0). Applied as ±jitter to the delay. Default: 0.25.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

/// What happens after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once `delay` has elapsed.
    Retry {
        /// Wait before the next attempt.
        delay: Duration,
    },
    /// The budget is spent.
    Exhausted,
}

/// `(attempts_made, max_attempts, last_attempt)` plus the backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryState {
    config: ReconnectConfig,
    attempts_made: u32,
    max_attempts: u32,
    last_attempt: Option<Instant>,
    next_attempt_at: Option<Instant>,
    current_delay: Duration,
}

impl RetryState {
    /// Create a state with the given backoff and attempt budget.
    pub fn new(config: ReconnectConfig, max_attempts: u32) -> Self {
        let initial = config.initial_delay;
        Self {
            config,
            attempts_made: 0,
            max_attempts,
            last_attempt: None,
            next_attempt_at: None,
            current_delay: initial,
        }
    }

    /// Start a fresh budget of `max_attempts`; the next attempt is due now.
    pub fn reset(&mut self, max_attempts: u32) {
        self.attempts_made = 0;
        self.max_attempts = max_attempts;
        self.next_attempt_at = None;
        self.current_delay = self.config.initial_delay;
    }

    /// Record that an attempt started at `now`.
    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
        self.next_attempt_at = None;
    }

    /// Record a failed attempt and decide whether to try again.
    pub fn record_failure(&mut self, now: Instant) -> RetryDecision {
        self.attempts_made += 1;
        if self.is_exhausted() {
            self.next_attempt_at = None;
            return RetryDecision::Exhausted;
        }
        let delay = self.next_delay();
        self.next_attempt_at = Some(now + delay);
        RetryDecision::Retry { delay }
    }

    /// Whether an automatic attempt may start at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        !self.is_exhausted() && self.next_attempt_at.is_none_or(|at| now >= at)
    }

    /// Whether the budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    /// Failed attempts since the last reset.
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Budget of the current connect request.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// When the most recent attempt started.
    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// When the next automatic attempt becomes due, if one is scheduled.
    pub fn next_attempt_at(&self) -> Option<Instant> {
        self.next_attempt_at
    }

    fn next_delay(&mut self) -> Duration {
        let max = self.config.max_delay;
        let base = self.current_delay;

        // Apply jitter: uniform random in [base * (1 - jitter), base * (1 + jitter)]
        let jitter = if self.config.jitter.is_finite() {
            self.config.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let jittered = if jitter > 0.0 {
            let mut rng = rand::rng();
            let factor = rng.random_range((1.0 - jitter)..=(1.0 + jitter));
            scale(base, factor, max)
        } else {
            base
        };

        self.current_delay = scale(base, self.config.backoff_multiplier, max).min(max);

        jittered.min(max)
    }
}

/// `delay * factor`, or `fallback` when the product is not a valid duration
/// (negative, NaN, or too large).
fn scale(delay: Duration, factor: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_no_jitter() -> ReconnectConfig {
        ReconnectConfig {
            jitter: 0.0,
            ..Default::default()
        }
    }

    fn delay_of(decision: RetryDecision) -> Duration {
        match decision {
            RetryDecision::Retry { delay } => delay,
            RetryDecision::Exhausted => panic!("budget unexpectedly exhausted"),
        }
    }

    #[test]
    fn test_fresh_state_is_due_immediately() {
        let state = RetryState::new(config_no_jitter(), 3);
        assert!(state.is_due(Instant::now()));
        assert_eq!(state.attempts_made(), 0);
    }

    #[test]
    fn test_backoff_sequence_is_exponential() {
        let mut state = RetryState::new(config_no_jitter(), 10);
        let now = Instant::now();

        let delays: Vec<_> = (0..4)
            .map(|_| delay_of(state.record_failure(now)))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn test_max_backoff_is_capped() {
        let mut state = RetryState::new(config_no_jitter(), 100);
        let now = Instant::now();
        let mut last_delay = Duration::ZERO;
        for _ in 0..15 {
            last_delay = delay_of(state.record_failure(now));
        }
        assert_eq!(last_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_budget_exhausted_after_max_attempts() {
        let mut state = RetryState::new(config_no_jitter(), 3);
        let now = Instant::now();
        assert!(matches!(state.record_failure(now), RetryDecision::Retry { .. }));
        assert!(matches!(state.record_failure(now), RetryDecision::Retry { .. }));
        assert_eq!(state.record_failure(now), RetryDecision::Exhausted);
        assert!(state.is_exhausted());
        assert!(!state.is_due(now + Duration::from_secs(3600)));
    }

    #[test]
    fn test_retry_waits_for_delay() {
        let mut state = RetryState::new(config_no_jitter(), 3);
        let now = Instant::now();
        state.record_attempt(now);
        state.record_failure(now);
        assert!(!state.is_due(now + Duration::from_millis(999)));
        assert!(state.is_due(now + Duration::from_secs(1)));
        assert_eq!(state.last_attempt(), Some(now));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut state = RetryState::new(config_no_jitter(), 3);
        let now = Instant::now();
        state.record_failure(now);
        state.record_failure(now);
        assert_eq!(state.attempts_made(), 2);

        state.reset(5);
        assert_eq!(state.attempts_made(), 0);
        assert_eq!(state.max_attempts(), 5);
        assert!(state.is_due(now));
        assert_eq!(delay_of(state.record_failure(now)), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_multiplier_caps_at_max_delay() {
        let config = ReconnectConfig {
            backoff_multiplier: 1e30,
            ..config_no_jitter()
        };
        let mut state = RetryState::new(config, 10);
        let now = Instant::now();
        assert_eq!(delay_of(state.record_failure(now)), Duration::from_secs(1));
        assert_eq!(delay_of(state.record_failure(now)), Duration::from_secs(30));
        assert_eq!(delay_of(state.record_failure(now)), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_backoff_shape_never_panics() {
        for (backoff_multiplier, jitter) in [
            (f64::NAN, 0.0),
            (-2.0, 0.0),
            (f64::INFINITY, 0.25),
            (2.0, f64::NAN),
            (2.0, 5.0),
        ] {
            let config = ReconnectConfig {
                backoff_multiplier,
                jitter,
                ..Default::default()
            };
            let mut state = RetryState::new(config, 5);
            let now = Instant::now();
            for _ in 0..4 {
                let delay = delay_of(state.record_failure(now));
                assert!(delay <= Duration::from_secs(30), "{delay:?}");
            }
        }
    }

    #[test]
    fn test_jitter_varies_delay() {
        let delays: Vec<_> = (0..10)
            .map(|_| {
                let mut state = RetryState::new(ReconnectConfig::default(), 100);
                delay_of(state.record_failure(Instant::now()))
            })
            .collect();

        let all_same = delays.windows(2).all(|w| w[0] == w[1]);
        assert!(!all_same, "Jitter should cause variation in delays: {delays:?}");
        assert!(delays.iter().all(|d| *d >= Duration::from_millis(750)));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(1250)));
    }
}
