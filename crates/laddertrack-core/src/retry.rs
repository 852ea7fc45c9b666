//! Retry decisions with fixed or exponential backoff.
//!
//! The policy only looks at the outcome of a physical attempt and the attempt
//! count; it knows nothing about the provider it serves.

use std::time::Duration;

/// Outcome of one physical attempt, as seen by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// Non-success HTTP status that was not classified as empty.
    StatusError(u16),
    /// The body could not be decoded.
    BodyError,
    /// Connect, read, or write timeout.
    TimeoutError,
    /// Connection refused/reset or another transport failure.
    TransportError,
}

impl AttemptOutcome {
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::Success => false,
            Self::StatusError(status) => status >= 500 && status < 600,
            Self::BodyError | Self::TimeoutError | Self::TransportError => true,
        }
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Stop,
}

/// Attempt bookkeeping for one logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    attempt: u32,
    max_attempts: u32,
    last_outcome: Option<AttemptOutcome>,
}

impl RetryContext {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            last_outcome: None,
        }
    }

    /// Record a finished physical attempt.
    pub fn record(&mut self, outcome: AttemptOutcome) {
        self.attempt = self.attempt.saturating_add(1);
        self.last_outcome = Some(outcome);
    }

    /// Number of physical attempts made so far.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn last_outcome(&self) -> Option<AttemptOutcome> {
        self.last_outcome
    }

    pub const fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^retry`, capped at `max`, optionally jittered by +/- 50%.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(2),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(retry.min(i32::MAX as u32) as i32);
                let seconds = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(seconds.max(0.0));

                if !jitter {
                    return delay;
                }

                let millis = delay.as_millis() as u64;
                let spread = millis / 2;
                let offset = fastrand::u64(0..=spread * 2);
                Duration::from_millis((millis + offset).saturating_sub(spread))
            }
        }
    }

    /// Upper bound of the delay before retry number `retry`, jitter included.
    pub fn max_delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let plain = Self::Exponential {
                    base,
                    factor,
                    max,
                    jitter: false,
                }
                .delay(retry);
                if jitter {
                    plain + plain / 2
                } else {
                    plain
                }
            }
        }
    }
}

/// Per-provider retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total physical attempts for one logical operation (first try included).
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed { delay },
        }
    }

    /// Single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::fixed(Duration::ZERO, 1)
    }

    /// Millisecond-scale policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(Duration::from_millis(1), max_attempts)
    }

    pub fn context(&self) -> RetryContext {
        RetryContext::new(self.max_attempts)
    }

    /// Decide whether the operation tracked by `context` should try again.
    pub fn decide(&self, context: &RetryContext) -> RetryDecision {
        let Some(outcome) = context.last_outcome() else {
            return RetryDecision::Retry {
                delay: Duration::ZERO,
            };
        };

        if !outcome.is_retryable() || context.exhausted() {
            return RetryDecision::Stop;
        }

        RetryDecision::Retry {
            delay: self.backoff.delay(context.attempt().saturating_sub(1)),
        }
    }

    /// Worst-case total backoff time across all retries.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|retry| self.backoff.max_delay(retry))
            .sum()
    }
}
