use crate::domain::ids::{AgentId, CallAttemptId, LeadId};
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    Answered,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl CallStatus {
    pub const ALL: [CallStatus; 8] = [
        CallStatus::Initiated,
        CallStatus::Ringing,
        CallStatus::Answered,
        CallStatus::Completed,
        CallStatus::Busy,
        CallStatus::NoAnswer,
        CallStatus::Failed,
        CallStatus::Canceled,
    ];

    pub const TERMINAL: [CallStatus; 5] = [
        CallStatus::Completed,
        CallStatus::Busy,
        CallStatus::NoAnswer,
        CallStatus::Failed,
        CallStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::Completed => "completed",
            CallStatus::Busy => "busy",
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Failed => "failed",
            CallStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Outcomes that consume one of the lead's attempts.
    pub fn counts_as_attempt(self) -> bool {
        matches!(
            self,
            CallStatus::Busy | CallStatus::NoAnswer | CallStatus::Failed
        )
    }

    /// Position in the provider's lifecycle. Transitions only move forward.
    pub fn progress(self) -> u8 {
        match self {
            CallStatus::Initiated => 0,
            CallStatus::Ringing => 1,
            CallStatus::Answered => 2,
            _ => 3,
        }
    }

    pub fn can_transition_to(self, next: CallStatus) -> bool {
        !self.is_terminal() && next.progress() > self.progress()
    }

    /// Maps a provider status word onto the fixed status set.
    pub fn from_provider(value: &str) -> Result<Self, CoreError> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "queued" | "initiated" => Ok(CallStatus::Initiated),
            "ringing" => Ok(CallStatus::Ringing),
            "in_progress" | "answered" => Ok(CallStatus::Answered),
            "completed" => Ok(CallStatus::Completed),
            "busy" => Ok(CallStatus::Busy),
            "no_answer" => Ok(CallStatus::NoAnswer),
            "failed" => Ok(CallStatus::Failed),
            "canceled" | "cancelled" => Ok(CallStatus::Canceled),
            _ => Err(CoreError::UnknownProviderStatus(value.to_string())),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| CoreError::InvalidCallStatus(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAttempt {
    pub id: CallAttemptId,
    pub lead_id: LeadId,
    pub agent_id: Option<AgentId>,
    pub provider_call_id: Option<String>,
    pub status: CallStatus,
    pub started_at: i64,
    pub answered_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub duration_secs: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: i64,
}

impl CallAttempt {
    /// Talk time, `ended - answered`, once both are known.
    pub fn derived_duration(&self) -> Option<i64> {
        match (self.answered_at, self.ended_at) {
            (Some(answered), Some(ended)) if ended >= answered => Some(ended - answered),
            _ => None,
        }
    }
}
