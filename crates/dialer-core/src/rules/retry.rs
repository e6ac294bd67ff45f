use crate::domain::CallStatus;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const MAX_ATTEMPTS_LIMIT: i32 = 100;
pub const DEFAULT_NO_ANSWER_DELAY_SECS: i64 = 30 * 60;
pub const DEFAULT_BUSY_DELAY_SECS: i64 = 15 * 60;
pub const DEFAULT_FAILED_DELAY_SECS: i64 = 0;

/// Fixed per-outcome delays with one attempt cap shared by all counted outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub no_answer_delay_secs: i64,
    pub busy_delay_secs: i64,
    pub failed_delay_secs: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            no_answer_delay_secs: DEFAULT_NO_ANSWER_DELAY_SECS,
            busy_delay_secs: DEFAULT_BUSY_DELAY_SECS,
            failed_delay_secs: DEFAULT_FAILED_DELAY_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to `pending`, eligible again at `next_eligible_at`.
    Retry {
        attempt_count: i32,
        next_eligible_at: i64,
    },
    /// Cap reached: `failed` and retired.
    Retire { attempt_count: i32 },
    /// The outcome does not consume an attempt.
    NotCounted,
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_attempts <= 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(CoreError::InvalidMaxAttempts(self.max_attempts));
        }
        for delay in [
            self.no_answer_delay_secs,
            self.busy_delay_secs,
            self.failed_delay_secs,
        ] {
            if delay < 0 {
                return Err(CoreError::InvalidRetryDelay(delay));
            }
        }
        Ok(())
    }

    fn delay_for(&self, outcome: CallStatus) -> i64 {
        match outcome {
            CallStatus::NoAnswer => self.no_answer_delay_secs,
            CallStatus::Busy => self.busy_delay_secs,
            _ => self.failed_delay_secs,
        }
    }

    pub fn decide(&self, now_utc: i64, attempt_count: i32, outcome: CallStatus) -> RetryDecision {
        if !outcome.counts_as_attempt() {
            return RetryDecision::NotCounted;
        }
        let delay = self.delay_for(outcome);

        let attempt_count = attempt_count.saturating_add(1).min(self.max_attempts);
        if attempt_count >= self.max_attempts {
            RetryDecision::Retire { attempt_count }
        } else {
            RetryDecision::Retry {
                attempt_count,
                next_eligible_at: now_utc + delay,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryDecision, RetryPolicy};
    use crate::domain::CallStatus;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn no_answer_waits_thirty_minutes() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(NOW, 0, CallStatus::NoAnswer),
            RetryDecision::Retry {
                attempt_count: 1,
                next_eligible_at: NOW + 1800
            }
        );
    }

    #[test]
    fn busy_waits_fifteen_minutes() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(NOW, 1, CallStatus::Busy),
            RetryDecision::Retry {
                attempt_count: 2,
                next_eligible_at: NOW + 900
            }
        );
    }

    #[test]
    fn cap_is_shared_across_outcome_types() {
        let policy = RetryPolicy::default();
        let mut count = 0;
        for outcome in [CallStatus::NoAnswer, CallStatus::Busy] {
            match policy.decide(NOW, count, outcome) {
                RetryDecision::Retry { attempt_count, .. } => count = attempt_count,
                other => panic!("unexpected decision {other:?}"),
            }
        }
        assert_eq!(
            policy.decide(NOW, count, CallStatus::Failed),
            RetryDecision::Retire { attempt_count: 3 }
        );
    }

    #[test]
    fn count_never_exceeds_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(NOW, 3, CallStatus::NoAnswer),
            RetryDecision::Retire { attempt_count: 3 }
        );
    }

    #[test]
    fn connection_outcomes_are_not_counted() {
        let policy = RetryPolicy::default();
        for outcome in [
            CallStatus::Completed,
            CallStatus::Canceled,
            CallStatus::Answered,
        ] {
            assert_eq!(policy.decide(NOW, 0, outcome), RetryDecision::NotCounted);
        }
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut policy = RetryPolicy::default();
        policy.max_attempts = 0;
        assert!(policy.validate().is_err());
        let mut policy = RetryPolicy::default();
        policy.busy_delay_secs = -1;
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }
}
