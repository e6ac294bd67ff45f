use crate::domain::{CallStatus, LeadStatus};
use crate::rules::retry::{RetryDecision, RetryPolicy};

/// What a call status update does to the lead that owns the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadEffect {
    Unchanged,
    Answered,
    Transferred,
    Retry {
        attempt_count: i32,
        next_eligible_at: i64,
    },
    Retire {
        attempt_count: i32,
    },
    /// Back to `pending` immediately without consuming an attempt.
    Requeue,
}

impl LeadEffect {
    /// The lead leaves the working set and its agent is freed.
    pub fn ends_call(self) -> bool {
        !matches!(self, LeadEffect::Unchanged | LeadEffect::Answered)
    }
}

pub fn lead_effect(
    policy: &RetryPolicy,
    now_utc: i64,
    lead_status: LeadStatus,
    attempt_count: i32,
    call_status: CallStatus,
) -> LeadEffect {
    if !lead_status.is_in_flight() {
        return LeadEffect::Unchanged;
    }

    match call_status {
        CallStatus::Initiated | CallStatus::Ringing => LeadEffect::Unchanged,
        CallStatus::Answered => {
            if lead_status == LeadStatus::Calling {
                LeadEffect::Answered
            } else {
                LeadEffect::Unchanged
            }
        }
        CallStatus::Completed => LeadEffect::Transferred,
        CallStatus::Canceled => LeadEffect::Requeue,
        CallStatus::Busy | CallStatus::NoAnswer | CallStatus::Failed => {
            match policy.decide(now_utc, attempt_count, call_status) {
                RetryDecision::Retry {
                    attempt_count,
                    next_eligible_at,
                } => LeadEffect::Retry {
                    attempt_count,
                    next_eligible_at,
                },
                RetryDecision::Retire { attempt_count } => LeadEffect::Retire { attempt_count },
                RetryDecision::NotCounted => LeadEffect::Requeue,
            }
        }
    }
}
