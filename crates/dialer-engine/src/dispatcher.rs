use crate::error::Result;
use crate::events::{EventBus, LifecycleEvent, LifecycleEventKind};
use crate::gateway::{CallbackTargets, PlaceCallRequest, TelephonyGateway};
use crate::reconciler::{connect_instructions, ConnectInstructions, Reconciled, Reconciler};
use crate::recovery;
use crate::working_set::{InFlight, WorkingSet};
use dialer_core::domain::{AgentId, CallAttemptId, CallStatus, LeadId};
use dialer_core::rules::{LeadEffect, RetryPolicy};
use dialer_core::time::Clock;
use dialer_store::repo::{RecoveredLead, StatusUpdateResult, StuckThresholds};
use dialer_store::Store;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PLACEMENT_FAILED_ERROR_CODE: &str = "placement_failed";

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub concurrency_limit: usize,
    pub stuck: StuckThresholds,
    pub retry: RetryPolicy,
    pub from_number: Option<String>,
    pub callbacks: CallbackTargets,
    pub ring_timeout_secs: u32,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 5,
            stuck: StuckThresholds {
                calling_secs: 5 * 60,
                answered_secs: 2 * 60 * 60,
            },
            retry: RetryPolicy::default(),
            from_number: None,
            callbacks: CallbackTargets::default(),
            ring_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    pub running: bool,
    pub active_count: usize,
    pub concurrency_limit: usize,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Paused,
    AtCapacity,
    NoEligibleLead,
    AlreadyInFlight(LeadId),
    NoAgent(LeadId),
    PlacementFailed {
        lead_id: LeadId,
        attempt_id: CallAttemptId,
        error: String,
    },
    Placed {
        lead_id: LeadId,
        agent_id: AgentId,
        attempt_id: CallAttemptId,
        provider_call_id: String,
    },
}

/// Owns the scheduler state. Every method takes `&mut self`, so callers
/// serialize through a single owner (see `runtime::spawn`).
pub struct Dispatcher {
    store: Store,
    gateway: Arc<dyn TelephonyGateway>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    settings: DispatcherSettings,
    working_set: WorkingSet,
    running: bool,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        gateway: Arc<dyn TelephonyGateway>,
        clock: Arc<dyn Clock>,
        settings: DispatcherSettings,
    ) -> Self {
        let working_set = WorkingSet::new(settings.concurrency_limit);
        Self {
            store,
            gateway,
            clock,
            events: EventBus::default(),
            settings,
            working_set,
            running: true,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stops new placements. In-flight calls keep reconciling.
    pub fn pause(&mut self) -> DispatcherStatus {
        if self.running {
            info!("dispatcher paused");
        }
        self.running = false;
        self.status()
    }

    pub fn resume(&mut self) -> DispatcherStatus {
        if !self.running {
            info!("dispatcher resumed");
        }
        self.running = true;
        self.status()
    }

    pub fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            running: self.running,
            active_count: self.working_set.len(),
            concurrency_limit: self.working_set.limit(),
        }
    }

    /// Places at most one call.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        if !self.running {
            return Ok(TickOutcome::Paused);
        }
        self.prune_working_set()?;
        if self.working_set.is_full() {
            return Ok(TickOutcome::AtCapacity);
        }

        let now = self.clock.now_utc();
        let claimed = self.store.leads().claim_next_eligible(now)?;
        let lead = match claimed {
            Some(lead) => lead,
            None => return Ok(TickOutcome::NoEligibleLead),
        };

        if self.working_set.contains(lead.id) {
            self.store.leads().release_claim(now, lead.id)?;
            warn!(lead_id = %lead.id, "claimed lead already in flight");
            return Ok(TickOutcome::AlreadyInFlight(lead.id));
        }

        let selected = self.store.agents().claim_available(now)?;
        let agent = match selected {
            Some(agent) => agent,
            None => {
                self.store.leads().release_claim(now, lead.id)?;
                debug!(lead_id = %lead.id, "no agent available");
                return Ok(TickOutcome::NoAgent(lead.id));
            }
        };

        let started = self.store.dispatch().begin_call(now, lead.id, agent.id);
        let attempt = match started {
            Ok(attempt) => attempt,
            Err(err) => {
                self.store.agents().release(now, agent.id)?;
                self.store.leads().release_claim(now, lead.id)?;
                return Err(err.into());
            }
        };
        self.working_set.insert(InFlight {
            lead_id: lead.id,
            agent_id: agent.id,
            attempt_id: attempt.id,
            started_at: now,
        });

        let request = PlaceCallRequest {
            to: lead.phone.clone(),
            from: self.settings.from_number.clone(),
            status_callback: self.settings.callbacks.status_url.clone(),
            answer_callback: self.settings.callbacks.answer_url.clone(),
            ring_timeout_secs: self.settings.ring_timeout_secs,
        };
        let gateway = Arc::clone(&self.gateway);
        let placed = gateway.place_call(&request).await;

        let now = self.clock.now_utc();
        match placed {
            Ok(placed) => {
                let recorded =
                    self.store
                        .dispatch()
                        .record_placement(now, attempt.id, &placed.provider_call_id);
                if let Err(err) = recorded {
                    self.working_set.remove(lead.id);
                    self.store.dispatch().abort_placement(
                        now,
                        attempt.id,
                        PLACEMENT_FAILED_ERROR_CODE,
                        &err.to_string(),
                    )?;
                    return Err(err.into());
                }

                info!(
                    lead_id = %lead.id,
                    agent_id = %agent.id,
                    provider_call_id = %placed.provider_call_id,
                    gateway = gateway.name(),
                    "call placed"
                );
                self.events.emit(LifecycleEvent {
                    kind: LifecycleEventKind::CallInitiated,
                    lead_id: lead.id,
                    agent_id: Some(agent.id),
                    call_attempt_id: attempt.id,
                    status: CallStatus::Initiated,
                    timestamp: now,
                });
                Ok(TickOutcome::Placed {
                    lead_id: lead.id,
                    agent_id: agent.id,
                    attempt_id: attempt.id,
                    provider_call_id: placed.provider_call_id,
                })
            }
            Err(err) => {
                let message = err.to_string();
                self.working_set.remove(lead.id);
                self.store.dispatch().abort_placement(
                    now,
                    attempt.id,
                    PLACEMENT_FAILED_ERROR_CODE,
                    &message,
                )?;
                warn!(lead_id = %lead.id, error = %message, "call placement failed");
                Ok(TickOutcome::PlacementFailed {
                    lead_id: lead.id,
                    attempt_id: attempt.id,
                    error: message,
                })
            }
        }
    }

    /// Feeds one provider status through the reconciler and updates the
    /// working set and observers to match.
    pub fn apply_outcome(
        &mut self,
        provider_call_id: &str,
        provider_status: &str,
        duration_secs: Option<i64>,
    ) -> Result<Reconciled> {
        let now = self.clock.now_utc();
        let reconciled = Reconciler::new(&self.store, self.settings.retry).apply(
            now,
            provider_call_id,
            provider_status,
            duration_secs,
        )?;

        if let StatusUpdateResult::Applied(applied) = &reconciled.update {
            if applied.effect.ends_call() || applied.attempt.status.is_terminal() {
                self.working_set.remove(applied.lead.id);
            }
            if applied.effect == LeadEffect::Answered {
                self.events.emit(LifecycleEvent {
                    kind: LifecycleEventKind::CallAnswered,
                    lead_id: applied.lead.id,
                    agent_id: applied.attempt.agent_id,
                    call_attempt_id: applied.attempt.id,
                    status: applied.attempt.status,
                    timestamp: now,
                });
            }
            self.events.emit(LifecycleEvent {
                kind: LifecycleEventKind::CallStatusUpdated,
                lead_id: applied.lead.id,
                agent_id: applied.attempt.agent_id,
                call_attempt_id: applied.attempt.id,
                status: applied.attempt.status,
                timestamp: now,
            });
        }
        Ok(reconciled)
    }

    pub fn connect_instructions(&self, provider_call_id: &str) -> Result<ConnectInstructions> {
        connect_instructions(&self.store, provider_call_id)
    }

    pub fn reset_stuck_leads(&mut self) -> Result<Vec<RecoveredLead>> {
        let now = self.clock.now_utc();
        let recovered = recovery::reset_stuck_leads(&self.store, now, self.settings.stuck)?;
        for lead in &recovered {
            self.working_set.remove(lead.lead_id);
        }
        Ok(recovered)
    }

    /// Drops entries whose lead was resolved outside this dispatcher.
    fn prune_working_set(&mut self) -> Result<()> {
        for lead_id in self.working_set.lead_ids() {
            let lead = self.store.leads().get(lead_id)?;
            let in_flight = lead.is_some_and(|lead| lead.status.is_in_flight());
            if !in_flight {
                debug!(lead_id = %lead_id, "pruned resolved lead from working set");
                self.working_set.remove(lead_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
