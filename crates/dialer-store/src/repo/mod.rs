pub mod agents;
pub mod call_attempts;
pub mod dispatch;
pub mod leads;

pub use agents::{AgentNew, AgentsRepo};
pub use call_attempts::{CallAttemptStats, CallAttemptsRepo};
pub use dispatch::{
    AppliedTransition, DispatchRepo, RecoveredLead, StatusUpdateResult, StuckThresholds,
    ORPHANED_ERROR_CODE, PROVIDER_FAILED_ERROR_CODE,
};
pub use leads::{LeadFilter, LeadNew, LeadUpdate, LeadsRepo};

use crate::error::{Result, StoreError};
use std::str::FromStr;

pub(crate) fn parse_id<T: FromStr>(raw: String) -> Result<T> {
    T::from_str(&raw).map_err(|_| StoreError::InvalidId(raw))
}

pub(crate) fn parse_optional_id<T: FromStr>(raw: Option<String>) -> Result<Option<T>> {
    raw.map(parse_id).transpose()
}
