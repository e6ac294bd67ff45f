use crate::error::{EngineError, Result};
use dialer_core::domain::{AgentId, CallAttemptId, CallStatus, LeadId};
use dialer_core::rules::RetryPolicy;
use dialer_core::CoreError;
use dialer_store::repo::StatusUpdateResult;
use dialer_store::Store;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of feeding one provider status into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub provider_call_id: String,
    pub attempt_id: CallAttemptId,
    pub lead_id: LeadId,
    pub agent_id: Option<AgentId>,
    pub received: CallStatus,
    pub update: StatusUpdateResult,
}

impl Reconciled {
    pub fn was_applied(&self) -> bool {
        matches!(self.update, StatusUpdateResult::Applied(_))
    }
}

/// Applies provider callbacks and console-entered outcomes by provider call id.
pub struct Reconciler<'a> {
    store: &'a Store,
    policy: RetryPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a Store, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn apply(
        &self,
        now_utc: i64,
        provider_call_id: &str,
        provider_status: &str,
        duration_secs: Option<i64>,
    ) -> Result<Reconciled> {
        let received = CallStatus::from_provider(provider_status)?;
        if let Some(duration) = duration_secs.filter(|value| *value < 0) {
            return Err(CoreError::InvalidDuration(duration).into());
        }

        let attempt = self
            .store
            .call_attempts()
            .find_by_provider_call_id(provider_call_id)?
            .ok_or_else(|| {
                warn!(
                    provider_call_id,
                    status = %received,
                    "callback references unknown call"
                );
                EngineError::UnresolvableCallback(provider_call_id.to_string())
            })?;

        let update = self.store.dispatch().apply_call_status(
            now_utc,
            attempt.id,
            received,
            duration_secs,
            &self.policy,
        )?;

        match &update {
            StatusUpdateResult::Applied(applied) => info!(
                provider_call_id,
                lead_id = %applied.lead.id,
                status = %received,
                lead_status = %applied.lead.status,
                attempt_count = applied.lead.attempt_count,
                "applied call status"
            ),
            StatusUpdateResult::Corrected(_) => debug!(
                provider_call_id,
                status = %received,
                "recorded late call duration"
            ),
            StatusUpdateResult::Rejected { current } => debug!(
                provider_call_id,
                status = %received,
                current = %current,
                "ignored stale or duplicate call status"
            ),
        }

        Ok(Reconciled {
            provider_call_id: provider_call_id.to_string(),
            attempt_id: attempt.id,
            lead_id: attempt.lead_id,
            agent_id: attempt.agent_id,
            received,
            update,
        })
    }
}

/// Where to bridge an answered call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectInstructions {
    pub provider_call_id: String,
    pub lead_id: LeadId,
    pub attempt_id: CallAttemptId,
    pub agent_id: AgentId,
    pub agent_phone: String,
}

pub fn connect_instructions(store: &Store, provider_call_id: &str) -> Result<ConnectInstructions> {
    let attempt = store
        .call_attempts()
        .find_by_provider_call_id(provider_call_id)?
        .ok_or_else(|| EngineError::UnresolvableCallback(provider_call_id.to_string()))?;
    if attempt.status.is_terminal() {
        return Err(EngineError::CallEnded(provider_call_id.to_string()));
    }
    let agent_id = attempt
        .agent_id
        .ok_or_else(|| EngineError::NoAgentAssigned(provider_call_id.to_string()))?;
    let agent = store
        .agents()
        .get(agent_id)?
        .ok_or_else(|| EngineError::NoAgentAssigned(provider_call_id.to_string()))?;

    Ok(ConnectInstructions {
        provider_call_id: provider_call_id.to_string(),
        lead_id: attempt.lead_id,
        attempt_id: attempt.id,
        agent_id,
        agent_phone: agent.phone,
    })
}
