use crate::error::Result;
use crate::repo::{parse_id, parse_optional_id};
use dialer_core::domain::{CallAttempt, CallAttemptId, CallStatus, LeadId};
use rusqlite::Connection;
use serde::Serialize;
use std::str::FromStr;

pub(crate) const CALL_ATTEMPT_COLUMNS: &str = "id, lead_id, agent_id, provider_call_id, status, started_at, answered_at, ended_at, duration_secs, error_code, error_message, updated_at";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallAttemptStats {
    pub total: i64,
    pub by_status: Vec<(CallStatus, i64)>,
    /// Mean of recorded durations on completed calls.
    pub average_talk_secs: Option<f64>,
}

pub struct CallAttemptsRepo<'a> {
    conn: &'a Connection,
}

impl<'a> CallAttemptsRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, id: CallAttemptId) -> Result<Option<CallAttempt>> {
        get_inner(self.conn, id)
    }

    pub fn find_by_provider_call_id(&self, provider_call_id: &str) -> Result<Option<CallAttempt>> {
        find_by_provider_call_id_inner(self.conn, provider_call_id)
    }

    /// Every attempt on a lead, oldest first.
    pub fn list_for_lead(&self, lead_id: LeadId) -> Result<Vec<CallAttempt>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CALL_ATTEMPT_COLUMNS} FROM call_attempts
             WHERE lead_id = ?1
             ORDER BY started_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([lead_id.to_string()])?;
        let mut attempts = Vec::new();
        while let Some(row) = rows.next()? {
            attempts.push(call_attempt_from_row(row)?);
        }
        Ok(attempts)
    }

    pub fn outstanding_for_lead(&self, lead_id: LeadId) -> Result<Option<CallAttempt>> {
        outstanding_for_lead_inner(self.conn, lead_id)
    }

    pub fn stats(&self) -> Result<CallAttemptStats> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM call_attempts GROUP BY status ORDER BY status ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut stats = CallAttemptStats::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            stats.total += count;
            stats.by_status.push((CallStatus::from_str(&status)?, count));
        }
        stats.average_talk_secs = self.conn.query_row(
            "SELECT AVG(duration_secs) FROM call_attempts
             WHERE status = ?1 AND duration_secs IS NOT NULL;",
            [CallStatus::Completed.as_str()],
            |row| row.get(0),
        )?;
        Ok(stats)
    }
}

pub(crate) fn get_inner(conn: &Connection, id: CallAttemptId) -> Result<Option<CallAttempt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CALL_ATTEMPT_COLUMNS} FROM call_attempts WHERE id = ?1;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(call_attempt_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn find_by_provider_call_id_inner(
    conn: &Connection,
    provider_call_id: &str,
) -> Result<Option<CallAttempt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CALL_ATTEMPT_COLUMNS} FROM call_attempts WHERE provider_call_id = ?1;"
    ))?;
    let mut rows = stmt.query([provider_call_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(call_attempt_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn outstanding_for_lead_inner(
    conn: &Connection,
    lead_id: LeadId,
) -> Result<Option<CallAttempt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CALL_ATTEMPT_COLUMNS} FROM call_attempts
         WHERE lead_id = ?1 AND status IN (?2, ?3, ?4)
         ORDER BY started_at DESC
         LIMIT 1;"
    ))?;
    let mut rows = stmt.query([
        lead_id.to_string(),
        CallStatus::Initiated.as_str().to_string(),
        CallStatus::Ringing.as_str().to_string(),
        CallStatus::Answered.as_str().to_string(),
    ])?;
    match rows.next()? {
        Some(row) => Ok(Some(call_attempt_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn call_attempt_from_row(row: &rusqlite::Row<'_>) -> Result<CallAttempt> {
    let status: String = row.get(4)?;
    Ok(CallAttempt {
        id: parse_id(row.get(0)?)?,
        lead_id: parse_id(row.get(1)?)?,
        agent_id: parse_optional_id(row.get(2)?)?,
        provider_call_id: row.get(3)?,
        status: CallStatus::from_str(&status)?,
        started_at: row.get(5)?,
        answered_at: row.get(6)?,
        ended_at: row.get(7)?,
        duration_secs: row.get(8)?,
        error_code: row.get(9)?,
        error_message: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
