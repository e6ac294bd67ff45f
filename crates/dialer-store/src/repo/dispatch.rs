use crate::error::{is_unique_violation, Result, StoreError};
use crate::repo::{agents, call_attempts, leads, parse_id, parse_optional_id};
use dialer_core::domain::{
    AgentId, CallAttempt, CallAttemptId, CallStatus, Lead, LeadId, LeadStatus,
};
use dialer_core::rules::{lead_effect, LeadEffect, RetryPolicy};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use tracing::debug;

pub const ORPHANED_ERROR_CODE: &str = "orphaned";
pub const PROVIDER_FAILED_ERROR_CODE: &str = "provider_failed";

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTransition {
    pub attempt: CallAttempt,
    pub lead: Lead,
    pub effect: LeadEffect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdateResult {
    Applied(AppliedTransition),
    /// Repeat of the terminal status that only filled in a missing duration.
    Corrected(CallAttempt),
    /// Duplicate or out-of-order update; nothing was written.
    Rejected { current: CallStatus },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredLead {
    pub lead_id: LeadId,
    pub previous_status: LeadStatus,
    pub agent_id: Option<AgentId>,
    pub canceled_attempts: Vec<CallAttemptId>,
}

/// How long a lead may sit without provider activity before recovery resets
/// it. Answered calls get their own, longer allowance since a live
/// conversation legitimately goes quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckThresholds {
    pub calling_secs: i64,
    pub answered_secs: i64,
}

/// Transitions spanning leads, call attempts and agents. Each runs in an
/// IMMEDIATE transaction and guards every write on the state it read.
pub struct DispatchRepo<'a> {
    conn: &'a Connection,
}

impl<'a> DispatchRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Moves a claimed lead to `calling` and opens its `initiated` attempt.
    pub fn begin_call(
        &self,
        now_utc: i64,
        lead_id: LeadId,
        agent_id: AgentId,
    ) -> Result<CallAttempt> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE leads SET status = ?2, assigned_agent_id = ?3, updated_at = ?4
             WHERE id = ?1 AND status = ?5 AND active = 1;",
            params![
                lead_id.to_string(),
                LeadStatus::Calling.as_str(),
                agent_id.to_string(),
                now_utc,
                LeadStatus::Claimed.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::Conflict(format!(
                "lead {lead_id} is not claimed"
            )));
        }

        let attempt = CallAttempt {
            id: CallAttemptId::new(),
            lead_id,
            agent_id: Some(agent_id),
            provider_call_id: None,
            status: CallStatus::Initiated,
            started_at: now_utc,
            answered_at: None,
            ended_at: None,
            duration_secs: None,
            error_code: None,
            error_message: None,
            updated_at: now_utc,
        };
        let inserted = tx.execute(
            "INSERT INTO call_attempts (id, lead_id, agent_id, provider_call_id, status, started_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6);",
            params![
                attempt.id.to_string(),
                lead_id.to_string(),
                agent_id.to_string(),
                attempt.status.as_str(),
                attempt.started_at,
                attempt.updated_at,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::Conflict(format!(
                    "lead {lead_id} already has an outstanding call"
                )));
            }
            Err(err) => return Err(err.into()),
        }

        tx.commit()?;
        Ok(attempt)
    }

    pub fn record_placement(
        &self,
        now_utc: i64,
        attempt_id: CallAttemptId,
        provider_call_id: &str,
    ) -> Result<CallAttempt> {
        let updated = self.conn.execute(
            "UPDATE call_attempts SET provider_call_id = ?2, updated_at = ?3
             WHERE id = ?1 AND provider_call_id IS NULL;",
            params![attempt_id.to_string(), provider_call_id, now_utc],
        );
        match updated {
            Ok(0) => {
                return Err(StoreError::Conflict(format!(
                    "call attempt {attempt_id} already has a provider call id"
                )));
            }
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::DuplicateProviderCallId(
                    provider_call_id.to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        }
        call_attempts::get_inner(self.conn, attempt_id)?
            .ok_or_else(|| StoreError::NotFound(attempt_id.to_string()))
    }

    /// Undoes `begin_call` after the gateway refused the call. The attempt is
    /// closed as `failed` and the lead goes back to `pending` without spending
    /// an attempt.
    pub fn abort_placement(
        &self,
        now_utc: i64,
        attempt_id: CallAttemptId,
        error_code: &str,
        error_message: &str,
    ) -> Result<CallAttempt> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let attempt = call_attempts::get_inner(&tx, attempt_id)?
            .ok_or_else(|| StoreError::NotFound(attempt_id.to_string()))?;
        if attempt.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "call attempt {attempt_id} is already {}",
                attempt.status
            )));
        }

        tx.execute(
            "UPDATE call_attempts
             SET status = ?2, ended_at = ?3, error_code = ?4, error_message = ?5, updated_at = ?3
             WHERE id = ?1 AND status = ?6;",
            params![
                attempt_id.to_string(),
                CallStatus::Failed.as_str(),
                now_utc,
                error_code,
                error_message,
                attempt.status.as_str(),
            ],
        )?;
        tx.execute(
            "UPDATE leads SET status = ?2, assigned_agent_id = NULL, updated_at = ?3
             WHERE id = ?1 AND status = ?4;",
            params![
                attempt.lead_id.to_string(),
                LeadStatus::Pending.as_str(),
                now_utc,
                LeadStatus::Calling.as_str(),
            ],
        )?;
        if let Some(agent_id) = attempt.agent_id {
            agents::release_inner(&tx, now_utc, agent_id)?;
        }
        tx.commit()?;

        call_attempts::get_inner(self.conn, attempt_id)?
            .ok_or_else(|| StoreError::NotFound(attempt_id.to_string()))
    }

    /// Applies one provider status to an attempt and carries the outcome onto
    /// its lead and agent. Terminal attempts never move again.
    pub fn apply_call_status(
        &self,
        now_utc: i64,
        attempt_id: CallAttemptId,
        status: CallStatus,
        duration_secs: Option<i64>,
        policy: &RetryPolicy,
    ) -> Result<StatusUpdateResult> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let attempt = call_attempts::get_inner(&tx, attempt_id)?
            .ok_or_else(|| StoreError::NotFound(attempt_id.to_string()))?;

        if !attempt.status.can_transition_to(status) {
            // A repeat of the terminal status may still carry the duration
            // the first report lacked.
            let late_secs = duration_secs.filter(|_| {
                attempt.status == status
                    && status.is_terminal()
                    && attempt.duration_secs.is_none()
            });
            let Some(late_secs) = late_secs else {
                debug!(
                    attempt_id = %attempt_id,
                    current = %attempt.status,
                    received = %status,
                    "rejected call status update"
                );
                return Ok(StatusUpdateResult::Rejected {
                    current: attempt.status,
                });
            };
            tx.execute(
                "UPDATE call_attempts SET duration_secs = ?2, updated_at = ?3
                 WHERE id = ?1 AND duration_secs IS NULL;",
                params![attempt_id.to_string(), late_secs, now_utc],
            )?;
            leads::fill_history_duration(&tx, attempt_id, late_secs)?;
            if let Some(agent_id) = attempt.agent_id {
                agents::add_talk_time_inner(&tx, now_utc, agent_id, late_secs)?;
            }
            tx.commit()?;
            let corrected = call_attempts::get_inner(self.conn, attempt_id)?
                .ok_or_else(|| StoreError::NotFound(attempt_id.to_string()))?;
            return Ok(StatusUpdateResult::Corrected(corrected));
        }

        let mut next = attempt.clone();
        next.status = status;
        if status == CallStatus::Answered {
            next.answered_at = Some(now_utc);
        }
        if status.is_terminal() {
            next.ended_at = Some(now_utc);
            next.duration_secs = duration_secs.or_else(|| next.derived_duration());
        }
        let error_code = (status == CallStatus::Failed).then_some(PROVIDER_FAILED_ERROR_CODE);

        let updated = tx.execute(
            "UPDATE call_attempts
             SET status = ?2, answered_at = ?3, ended_at = ?4, duration_secs = ?5,
                 error_code = COALESCE(error_code, ?6), updated_at = ?7
             WHERE id = ?1 AND status = ?8;",
            params![
                attempt_id.to_string(),
                status.as_str(),
                next.answered_at,
                next.ended_at,
                next.duration_secs,
                error_code,
                now_utc,
                attempt.status.as_str(),
            ],
        )?;
        if updated == 0 {
            return Ok(StatusUpdateResult::Rejected {
                current: attempt.status,
            });
        }

        let lead = leads::get_inner(&tx, attempt.lead_id)?
            .ok_or_else(|| StoreError::NotFound(attempt.lead_id.to_string()))?;
        let effect = lead_effect(policy, now_utc, lead.status, lead.attempt_count, status);
        apply_lead_effect(&tx, now_utc, &lead, effect)?;

        if status.is_terminal() {
            // Numbered by the lead attempt the call belonged to, so counted
            // outcomes line up with `attempt_count`.
            leads::append_history(
                &tx,
                attempt.lead_id,
                now_utc,
                leads::HistoryEntry {
                    call_attempt_id: attempt_id,
                    attempt_number: lead.attempt_count.saturating_add(1),
                    outcome: status,
                    duration_secs: next.duration_secs,
                    notes: error_code,
                },
            )?;
            if let Some(agent_id) = attempt.agent_id {
                agents::record_call_inner(
                    &tx,
                    now_utc,
                    agent_id,
                    status == CallStatus::Completed,
                    next.duration_secs.unwrap_or(0),
                )?;
                agents::release_inner(&tx, now_utc, agent_id)?;
            }
        }
        tx.commit()?;

        let attempt = call_attempts::get_inner(self.conn, attempt_id)?
            .ok_or_else(|| StoreError::NotFound(attempt_id.to_string()))?;
        let lead = leads::get_inner(self.conn, attempt.lead_id)?
            .ok_or_else(|| StoreError::NotFound(attempt.lead_id.to_string()))?;
        Ok(StatusUpdateResult::Applied(AppliedTransition {
            attempt,
            lead,
            effect,
        }))
    }

    /// Resets leads left in `claimed` or `calling` past `calling_secs`, or in
    /// `answered` past `answered_secs`, back to `pending`. Their outstanding
    /// attempts are canceled as orphaned and agents freed. The attempt count
    /// is never touched.
    pub fn reset_stuck(
        &self,
        now_utc: i64,
        thresholds: StuckThresholds,
    ) -> Result<Vec<RecoveredLead>> {
        let calling_cutoff = now_utc - thresholds.calling_secs;
        let answered_cutoff = now_utc - thresholds.answered_secs;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let mut stuck = Vec::new();
        {
            let mut stmt = tx.prepare(
                "SELECT id, status, assigned_agent_id FROM leads
                 WHERE (status IN (?1, ?2) AND updated_at < ?3)
                    OR (status = ?4 AND updated_at < ?5)
                 ORDER BY updated_at ASC;",
            )?;
            let mut rows = stmt.query(params![
                LeadStatus::Claimed.as_str(),
                LeadStatus::Calling.as_str(),
                calling_cutoff,
                LeadStatus::Answered.as_str(),
                answered_cutoff,
            ])?;
            while let Some(row) = rows.next()? {
                let id: LeadId = parse_id(row.get(0)?)?;
                let status: String = row.get(1)?;
                let agent_id: Option<AgentId> = parse_optional_id(row.get(2)?)?;
                stuck.push((id, status.parse::<LeadStatus>()?, agent_id));
            }
        }

        let mut recovered = Vec::with_capacity(stuck.len());
        for (lead_id, previous_status, agent_id) in stuck {
            let updated = tx.execute(
                "UPDATE leads SET status = ?2, assigned_agent_id = NULL, updated_at = ?3
                 WHERE id = ?1 AND status = ?4;",
                params![
                    lead_id.to_string(),
                    LeadStatus::Pending.as_str(),
                    now_utc,
                    previous_status.as_str(),
                ],
            )?;
            if updated == 0 {
                continue;
            }

            let mut canceled = Vec::new();
            let mut attempt_agents = Vec::new();
            {
                let mut stmt = tx.prepare(
                    "UPDATE call_attempts
                     SET status = ?2, ended_at = ?3, error_code = ?4,
                         error_message = 'reset by stuck-lead recovery', updated_at = ?3
                     WHERE lead_id = ?1 AND status IN (?5, ?6, ?7)
                     RETURNING id, agent_id;",
                )?;
                let mut rows = stmt.query(params![
                    lead_id.to_string(),
                    CallStatus::Canceled.as_str(),
                    now_utc,
                    ORPHANED_ERROR_CODE,
                    CallStatus::Initiated.as_str(),
                    CallStatus::Ringing.as_str(),
                    CallStatus::Answered.as_str(),
                ])?;
                while let Some(row) = rows.next()? {
                    let attempt_id: CallAttemptId = parse_id(row.get(0)?)?;
                    canceled.push(attempt_id);
                    if let Some(attempt_agent) = parse_optional_id::<AgentId>(row.get(1)?)? {
                        attempt_agents.push(attempt_agent);
                    }
                }
            }

            for agent in agent_id.iter().chain(attempt_agents.iter()) {
                agents::release_inner(&tx, now_utc, *agent)?;
            }

            recovered.push(RecoveredLead {
                lead_id,
                previous_status,
                agent_id,
                canceled_attempts: canceled,
            });
        }

        tx.commit()?;
        Ok(recovered)
    }
}

fn apply_lead_effect(
    conn: &Connection,
    now_utc: i64,
    lead: &Lead,
    effect: LeadEffect,
) -> Result<()> {
    let id = lead.id.to_string();
    let calling = LeadStatus::Calling.as_str();
    let answered = LeadStatus::Answered.as_str();

    match effect {
        LeadEffect::Unchanged => {
            // Any provider signal counts as activity for stuck-lead recovery.
            conn.execute(
                "UPDATE leads SET updated_at = ?2 WHERE id = ?1 AND status IN (?3, ?4);",
                params![id, now_utc, calling, answered],
            )?;
        }
        LeadEffect::Answered => {
            conn.execute(
                "UPDATE leads SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4;",
                params![id, answered, now_utc, calling],
            )?;
        }
        LeadEffect::Transferred => {
            conn.execute(
                "UPDATE leads SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status IN (?4, ?5);",
                params![
                    id,
                    LeadStatus::Transferred.as_str(),
                    now_utc,
                    calling,
                    answered
                ],
            )?;
        }
        LeadEffect::Retry {
            attempt_count,
            next_eligible_at,
        } => {
            conn.execute(
                "UPDATE leads
                 SET status = ?2, attempt_count = ?3, next_eligible_at = ?4,
                     assigned_agent_id = NULL, updated_at = ?5
                 WHERE id = ?1 AND status IN (?6, ?7);",
                params![
                    id,
                    LeadStatus::Pending.as_str(),
                    attempt_count,
                    next_eligible_at,
                    now_utc,
                    calling,
                    answered
                ],
            )?;
        }
        LeadEffect::Retire { attempt_count } => {
            conn.execute(
                "UPDATE leads
                 SET status = ?2, attempt_count = ?3, active = 0,
                     assigned_agent_id = NULL, updated_at = ?4
                 WHERE id = ?1 AND status IN (?5, ?6);",
                params![
                    id,
                    LeadStatus::Failed.as_str(),
                    attempt_count,
                    now_utc,
                    calling,
                    answered
                ],
            )?;
        }
        LeadEffect::Requeue => {
            conn.execute(
                "UPDATE leads SET status = ?2, assigned_agent_id = NULL, updated_at = ?3
                 WHERE id = ?1 AND status IN (?4, ?5);",
                params![id, LeadStatus::Pending.as_str(), now_utc, calling, answered],
            )?;
        }
    }
    Ok(())
}
