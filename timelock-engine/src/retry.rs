use chrono::{DateTime, Duration, Utc};

/// What the scheduler should do with a queued request that is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    /// Too soon after the previous attempt; leave it queued until `until`.
    Backoff { until: DateTime<Utc> },
    GiveUp,
}

/// Decides whether a request may be attempted again.
///
/// Policies are pure: the same inputs always produce the same decision.
pub trait RetryPolicy: Send + Sync + 'static {
    fn next_action(
        &self,
        attempts: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RetryDecision;

    fn max_attempts(&self) -> u32;
}

fn decide(
    attempts: u32,
    max_attempts: u32,
    last_attempt_at: Option<DateTime<Utc>>,
    delay: Duration,
    now: DateTime<Utc>,
) -> RetryDecision {
    if attempts >= max_attempts {
        return RetryDecision::GiveUp;
    }

    match last_attempt_at {
        Some(last) if now - last < delay => RetryDecision::Backoff {
            until: last + delay,
        },
        _ => RetryDecision::Retry,
    }
}

/// Fixed minimum spacing between attempts with a hard attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelayPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
}

impl FixedDelayPolicy {
    pub fn new(max_attempts: u32, min_delay: Duration) -> Self {
        Self {
            max_attempts,
            min_delay,
        }
    }
}

impl Default for FixedDelayPolicy {
    fn default() -> Self {
        Self::new(3, Duration::minutes(1))
    }
}

impl RetryPolicy for FixedDelayPolicy {
    fn next_action(
        &self,
        attempts: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        decide(
            attempts,
            self.max_attempts,
            last_attempt_at,
            self.min_delay,
            now,
        )
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Spacing grows geometrically with each failed attempt, up to `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoffPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl ExponentialBackoffPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    /// Required spacing after the `attempts`-th attempt.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::zero();
        }
        let exponent = (attempts - 1).min(32) as i32;
        let scaled = self.initial_delay.num_milliseconds() as f64 * self.factor.powi(exponent);
        let capped = scaled.min(self.max_delay.num_milliseconds() as f64);
        Duration::milliseconds(capped as i64)
    }
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::minutes(1),
            factor: 2.0,
            max_delay: Duration::minutes(30),
        }
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn next_action(
        &self,
        attempts: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        decide(
            attempts,
            self.max_attempts,
            last_attempt_at,
            self.delay_after(attempts),
            now,
        )
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
