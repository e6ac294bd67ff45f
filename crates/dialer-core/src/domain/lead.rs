use crate::domain::call_attempt::CallStatus;
use crate::domain::ids::{AgentId, LeadId};
use crate::domain::phone::normalize_phone;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Call ordering class. Ordering is by [`LeadPriority::rank`], never by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl LeadPriority {
    pub const ALL: [LeadPriority; 4] = [
        LeadPriority::Urgent,
        LeadPriority::High,
        LeadPriority::Medium,
        LeadPriority::Low,
    ];

    /// Higher rank is called first. This is also the persisted column value.
    pub fn rank(self) -> i64 {
        match self {
            LeadPriority::Low => 0,
            LeadPriority::Medium => 1,
            LeadPriority::High => 2,
            LeadPriority::Urgent => 3,
        }
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            0 => Some(LeadPriority::Low),
            1 => Some(LeadPriority::Medium),
            2 => Some(LeadPriority::High),
            3 => Some(LeadPriority::Urgent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeadPriority::Low => "low",
            LeadPriority::Medium => "medium",
            LeadPriority::High => "high",
            LeadPriority::Urgent => "urgent",
        }
    }
}

impl Default for LeadPriority {
    fn default() -> Self {
        LeadPriority::Medium
    }
}

impl PartialOrd for LeadPriority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LeadPriority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for LeadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadPriority {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(LeadPriority::Low),
            "medium" => Ok(LeadPriority::Medium),
            "high" => Ok(LeadPriority::High),
            "urgent" => Ok(LeadPriority::Urgent),
            _ => Err(CoreError::InvalidPriority(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Pending,
    Claimed,
    Calling,
    Answered,
    NoAnswer,
    Busy,
    Failed,
    Completed,
    Transferred,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::Claimed => "claimed",
            LeadStatus::Calling => "calling",
            LeadStatus::Answered => "answered",
            LeadStatus::NoAnswer => "no_answer",
            LeadStatus::Busy => "busy",
            LeadStatus::Failed => "failed",
            LeadStatus::Completed => "completed",
            LeadStatus::Transferred => "transferred",
        }
    }

    /// `failed` and `transferred` leads are never revisited.
    pub fn is_terminal(self) -> bool {
        matches!(self, LeadStatus::Failed | LeadStatus::Transferred)
    }

    /// A call for this lead is outstanding with the provider.
    pub fn is_in_flight(self) -> bool {
        matches!(self, LeadStatus::Calling | LeadStatus::Answered)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(LeadStatus::Pending),
            "claimed" => Ok(LeadStatus::Claimed),
            "calling" => Ok(LeadStatus::Calling),
            "answered" => Ok(LeadStatus::Answered),
            "no_answer" => Ok(LeadStatus::NoAnswer),
            "busy" => Ok(LeadStatus::Busy),
            "failed" => Ok(LeadStatus::Failed),
            "completed" => Ok(LeadStatus::Completed),
            "transferred" => Ok(LeadStatus::Transferred),
            _ => Err(CoreError::InvalidLeadStatus(value.to_string())),
        }
    }
}

/// One entry of a lead's append-only attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Lead attempt the outcome belongs to. Uncounted outcomes share the
    /// number of the attempt they did not consume.
    pub attempt_number: i32,
    pub occurred_at: i64,
    pub outcome: CallStatus,
    pub duration_secs: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub phone: String,
    pub name: Option<String>,
    pub priority: LeadPriority,
    pub status: LeadStatus,
    pub attempt_count: i32,
    pub next_eligible_at: Option<i64>,
    pub assigned_agent_id: Option<AgentId>,
    pub active: bool,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub attempt_history: Vec<AttemptRecord>,
}

impl Lead {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.phone.trim().is_empty() {
            return Err(CoreError::EmptyPhone);
        }
        if normalize_phone(&self.phone).as_deref() != Some(self.phone.as_str()) {
            return Err(CoreError::InvalidPhone(self.phone.clone()));
        }
        Ok(())
    }
}
