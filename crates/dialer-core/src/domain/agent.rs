use crate::domain::ids::AgentId;
use crate::domain::phone::normalize_phone;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    /// Number a connected call is bridged to.
    pub phone: String,
    pub available: bool,
    pub active: bool,
    pub on_call: bool,
    pub total_calls: i64,
    pub successful_calls: i64,
    pub total_talk_secs: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Agent {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::EmptyAgentName);
        }
        if normalize_phone(&self.phone).is_none() {
            return Err(CoreError::InvalidPhone(self.phone.clone()));
        }
        Ok(())
    }

    pub fn is_selectable(&self) -> bool {
        self.active && self.available && !self.on_call
    }
}
